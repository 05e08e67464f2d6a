use super::context::{format_timestamp, Paths, Session};
use super::ProposalCommand;
use quorate::governance::{Ballot, ProposalFilter, ProposalStatus};
use quorate::ProposalSummary;

pub async fn execute(
    paths: &Paths,
    actor: &str,
    command: ProposalCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(paths)?;
    let authority = &session.authority;

    match command {
        ProposalCommand::Create {
            id,
            description,
            required_votes,
            created_by,
        } => {
            let created_by = created_by.unwrap_or_else(|| actor.to_string());
            let result = authority
                .create_proposal(&id, &description, required_votes, &created_by)
                .await;
            let proposal = session.finish(result)?;
            println!(
                "✅ Proposal {} created ({} approvals required)",
                proposal.id, proposal.required_votes
            );
        }
        ProposalCommand::List { status } => {
            let status = status
                .map(|s| s.parse::<ProposalStatus>())
                .transpose()?;
            let proposals = authority.list_proposals(&ProposalFilter {
                status,
                created_by: None,
            });
            if proposals.is_empty() {
                println!("No proposals.");
            }
            for summary in &proposals {
                println!("{}", summary_line(summary));
            }
        }
        ProposalCommand::Show { id } => {
            let summary = authority.get_proposal(&id)?;
            print_details(&summary);
        }
        ProposalCommand::Vote {
            id,
            founder,
            reject,
            signature,
        } => {
            let mut ballot = if reject {
                Ballot::reject(founder)
            } else {
                Ballot::approve(founder)
            };
            if let Some(sig) = signature {
                ballot = ballot.signed(sig);
            }
            let result = authority.cast_vote(&id, ballot).await;
            let summary = session.finish(result)?;
            println!("✅ Vote recorded");
            println!("{}", summary_line(&summary));
        }
        ProposalCommand::Deploy { id } => {
            let result = authority.deploy(&id, actor).await;
            let deployed = session.finish(result)?;
            println!(
                "✅ Proposal {} deployed at {} (attempt {}, ref {})",
                deployed.proposal.id,
                deployed
                    .proposal
                    .deployed_at
                    .map(format_timestamp)
                    .unwrap_or_default(),
                deployed.proposal.deployment_attempts,
                deployed.receipt.reference
            );
        }
    }
    Ok(())
}

fn summary_line(summary: &ProposalSummary) -> String {
    let p = &summary.proposal;
    format!(
        "{:<24} {:<9} {}/{} approve, {} reject  {}",
        p.id, p.status, summary.tally.approve, summary.tally.required, summary.tally.reject,
        p.description
    )
}

fn print_details(summary: &ProposalSummary) {
    let p = &summary.proposal;
    println!("Proposal:    {}", p.id);
    println!("Description: {}", p.description);
    println!("Status:      {}", p.status);
    println!("Created:     {} by {}", format_timestamp(p.created_at), p.created_by);
    println!(
        "Tally:       {} of {} approvals ({} reject, {} outstanding, {} from removed founders)",
        summary.tally.approve,
        summary.tally.required,
        summary.tally.reject,
        summary.tally.outstanding,
        summary.tally.stale
    );
    if let Some(status) = p.deployment_status {
        println!(
            "Deployment:  {} after {} attempt(s)",
            status, p.deployment_attempts
        );
    }
    if let Some(at) = p.deployed_at {
        println!("Deployed:    {}", format_timestamp(at));
    }
    if let Some(canary) = &p.canary {
        println!(
            "Canary:      {:.0}% of traffic since {}",
            canary.cap_fraction * 100.0,
            format_timestamp(canary.promoted_at)
        );
    }
    println!("Votes:");
    for vote in &p.votes {
        println!(
            "  {:<16} {:<8} {}{}",
            vote.founder_id,
            if vote.approve { "approve" } else { "reject" },
            format_timestamp(vote.voted_at),
            if vote.signature.is_some() { "  signed" } else { "" }
        );
    }
}
