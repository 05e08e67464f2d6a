use super::context::{Paths, Session};
use super::FounderCommand;
use quorate::principals::{Principal, PrincipalId};

pub async fn execute(
    paths: &Paths,
    actor: &str,
    command: FounderCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(paths)?;
    let authority = &session.authority;

    match command {
        FounderCommand::Add {
            id,
            name,
            email,
            public_key,
        } => {
            let mut principal = Principal::new(id, name, email);
            if let Some(key) = public_key {
                principal = principal.with_public_key(key);
            }
            let result = authority.add_founder(principal, actor).await;
            let added = session.finish(result)?;
            println!(
                "✅ Founder {} added ({} founders)",
                added.id,
                authority.registry().founder_count()
            );
        }
        FounderCommand::Remove { id } => {
            let result = authority.remove_founder(&PrincipalId::from(id), actor).await;
            let removed = session.finish(result)?;
            println!(
                "✅ Founder {} removed ({} founders remain)",
                removed.id,
                authority.registry().founder_count()
            );
        }
        FounderCommand::List => {
            let founders = authority.list_founders();
            if founders.is_empty() {
                println!("No founders registered.");
            }
            for founder in founders {
                let key = if founder.public_key.is_some() {
                    "signing key"
                } else {
                    "no key"
                };
                println!(
                    "{:<16} {:<24} {:<32} {}",
                    founder.id, founder.display_name, founder.email, key
                );
            }
            let registry = authority.registry();
            println!(
                "Admins: {} of {} seats",
                registry.admin_count(),
                registry.admin_cap()
            );
        }
    }
    Ok(())
}
