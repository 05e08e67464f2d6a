use super::context::{format_timestamp, Paths, Session};
use super::InviteCommand;
use quorate::admission::{Endorsement, InvitationQuery, NewInvitation, PendingInvitation, Role};

pub async fn execute(
    paths: &Paths,
    actor: &str,
    command: InviteCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(paths)?;
    let authority = &session.authority;

    match command {
        InviteCommand::Create {
            email,
            role,
            approvals,
            expiry_days,
        } => {
            let role = role.parse::<Role>()?;
            let mut request = NewInvitation::new(email, role, actor).with_approvals(approvals);
            if let Some(days) = expiry_days {
                request = request.expiring_in_days(days);
            }
            let result = authority.create_invitation(request).await;
            let invitation = session.finish(result)?;
            println!("✅ Invitation {} created", invitation.id);
            print_invitation(&invitation);
        }
        InviteCommand::List {
            search,
            limit,
            offset,
        } => {
            let page = authority.list_pending_invitations(&InvitationQuery {
                search,
                limit,
                offset,
            });
            if page.items.is_empty() {
                println!("No pending invitations.");
            }
            for view in &page.items {
                let inv = &view.invitation;
                println!(
                    "{:<36} {:<32} {:<6} {} approval(s)  expires {}{}",
                    inv.id,
                    inv.email,
                    inv.requested_role,
                    inv.founder_approvals.len(),
                    format_timestamp(inv.expires_at),
                    if view.expired { "  (expired)" } else { "" }
                );
            }
            println!(
                "Showing {} of {} (offset {}, limit {})",
                page.items.len(),
                page.total,
                page.offset,
                page.limit
            );
        }
        InviteCommand::Endorse {
            id,
            founder,
            signature,
        } => {
            let mut endorsement = Endorsement::new(founder);
            if let Some(sig) = signature {
                endorsement = endorsement.signed(sig);
            }
            let result = authority.endorse_invitation(&id, endorsement).await;
            let invitation = session.finish(result)?;
            println!("✅ Endorsement recorded");
            print_invitation(&invitation);
        }
        InviteCommand::Approve { id, role } => {
            let role = match role {
                Some(role) => role.parse::<Role>()?,
                None => authority.get_invitation(&id)?.requested_role,
            };
            let result = authority.approve_invitation(&id, role, actor).await;
            let account = session.finish(result)?;
            println!(
                "✅ Account {} activated for {} as {}",
                account.id, account.email, account.assigned_role
            );
            let approvers: Vec<&str> = account.approved_by.iter().map(|id| id.as_str()).collect();
            println!("Approved by: {}", approvers.join(", "));
        }
        InviteCommand::Reject { id } => {
            let result = authority.reject_invitation(&id, actor).await;
            session.finish(result)?;
            println!("✅ Invitation {} rejected", id);
        }
    }
    Ok(())
}

fn print_invitation(invitation: &PendingInvitation) {
    println!("Email:     {}", invitation.email);
    println!("Role:      {}", invitation.requested_role);
    println!("Expires:   {}", format_timestamp(invitation.expires_at));
    let approvals: Vec<&str> = invitation
        .founder_approvals
        .iter()
        .map(|id| id.as_str())
        .collect();
    if approvals.is_empty() {
        println!("Approvals: none yet");
    } else {
        println!("Approvals: {}", approvals.join(", "));
    }
}
