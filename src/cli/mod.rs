use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod audit;
pub mod canary;
pub mod context;
pub mod founder;
pub mod init;
pub mod invite;
pub mod keys;
pub mod proposal;
pub mod version;

#[derive(Parser)]
#[command(name = "quorate")]
#[command(author = "Quorate Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the quorum-gated authorization engine", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/quorate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding state.json and audit.jsonl (overrides [storage])
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Name recorded as the actor in audit entries
    #[arg(long, global = true, default_value = "operator")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config and an empty state file
    Init {
        /// Overwrite an existing config and state
        #[arg(long)]
        force: bool,
    },

    /// Manage the founder roster
    Founder {
        #[command(subcommand)]
        command: FounderCommand,
    },

    /// Create, vote on and deploy proposals
    Proposal {
        #[command(subcommand)]
        command: ProposalCommand,
    },

    /// Invite users and admins
    Invite {
        #[command(subcommand)]
        command: InviteCommand,
    },

    /// Model canary promotion
    Canary {
        #[command(subcommand)]
        command: CanaryCommand,
    },

    /// Show or verify the audit log
    Audit {
        /// Only this event type (e.g. vote_cast)
        #[arg(long)]
        event_type: Option<String>,

        #[arg(long)]
        actor_filter: Option<String>,

        /// Only this proposal/invitation/founder id
        #[arg(long)]
        entity: Option<String>,

        /// Only denied or failed entries
        #[arg(long)]
        failures: bool,

        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Verify the hash chain instead of listing
        #[arg(long)]
        verify: bool,
    },

    /// Generate a founder signing key
    Keygen {
        /// File to write the private key to (hex PKCS#8)
        #[arg(long)]
        out: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Sign a vote or endorsement with a founder key
    Sign {
        /// Private key file written by `keygen`
        #[arg(long)]
        key: PathBuf,

        #[command(subcommand)]
        target: SignTarget,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum FounderCommand {
    /// Add a founder
    Add {
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// Hex Ed25519 public key for signed approvals
        #[arg(long)]
        public_key: Option<String>,
    },

    /// Remove a founder (their votes stop counting)
    Remove { id: String },

    /// List founders
    List,
}

#[derive(Subcommand)]
pub enum ProposalCommand {
    /// Create a proposal
    Create {
        id: String,

        #[arg(long)]
        description: String,

        /// Approving votes needed (default from [governance])
        #[arg(long)]
        required_votes: Option<u32>,

        /// Creator recorded on the proposal (default: --actor)
        #[arg(long)]
        created_by: Option<String>,
    },

    /// List proposals with tallies
    List {
        /// pending, voting, approved, rejected or deployed
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one proposal and its votes
    Show { id: String },

    /// Cast a founder's vote
    Vote {
        id: String,

        #[arg(long)]
        founder: String,

        /// Vote against instead of for
        #[arg(long)]
        reject: bool,

        /// Hex signature from `quorate sign vote`
        #[arg(long)]
        signature: Option<String>,
    },

    /// Run the apply action for an approved proposal
    Deploy { id: String },
}

#[derive(Subcommand)]
pub enum InviteCommand {
    /// Create an invitation
    Create {
        email: String,

        /// user or admin
        #[arg(long, default_value = "user")]
        role: String,

        /// Founder approvals collected out of band (repeatable)
        #[arg(long = "approve")]
        approvals: Vec<String>,

        #[arg(long)]
        expiry_days: Option<u32>,
    },

    /// List pending invitations
    List {
        /// Email substring
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Record one founder's approval
    Endorse {
        id: String,

        #[arg(long)]
        founder: String,

        /// Hex signature from `quorate sign endorse`
        #[arg(long)]
        signature: Option<String>,
    },

    /// Activate the account if quorum for the assigned role is met
    Approve {
        id: String,

        /// Role to assign (default: the requested role)
        #[arg(long)]
        role: Option<String>,
    },

    /// Delete a pending invitation
    Reject { id: String },
}

#[derive(Subcommand)]
pub enum CanaryCommand {
    /// Promote a model to canary once its proposal is approved
    Promote {
        model_id: String,

        /// Fraction of traffic routed to the candidate, in (0, 1]
        #[arg(long)]
        cap: f64,
    },
}

#[derive(Subcommand)]
pub enum SignTarget {
    /// Sign a ballot
    Vote {
        proposal_id: String,

        #[arg(long)]
        founder: String,

        #[arg(long)]
        reject: bool,
    },

    /// Sign an invitation endorsement
    Endorse {
        invitation_id: String,

        #[arg(long)]
        founder: String,
    },
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let paths = context::Paths::resolve(cli.config, cli.data_dir);
    let actor = cli.actor;

    match cli.command {
        Commands::Init { force } => init::execute(&paths, force),
        Commands::Founder { command } => founder::execute(&paths, &actor, command).await,
        Commands::Proposal { command } => proposal::execute(&paths, &actor, command).await,
        Commands::Invite { command } => invite::execute(&paths, &actor, command).await,
        Commands::Canary { command } => canary::execute(&paths, &actor, command).await,
        Commands::Audit {
            event_type,
            actor_filter,
            entity,
            failures,
            limit,
            verify,
        } => audit::execute(
            &paths,
            audit::AuditArgs {
                event_type,
                actor: actor_filter,
                entity,
                failures,
                limit,
                verify,
            },
        ),
        Commands::Keygen { out, force } => keys::keygen(&out, force),
        Commands::Sign { key, target } => keys::sign(&key, target),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
