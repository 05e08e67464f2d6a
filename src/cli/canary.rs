use super::context::{format_timestamp, Paths, Session};
use super::CanaryCommand;
use quorate::deployment::promotion_proposal_id;
use quorate::GateError;

pub async fn execute(
    paths: &Paths,
    actor: &str,
    command: CanaryCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(paths)?;

    match command {
        CanaryCommand::Promote { model_id, cap } => {
            let result = session.authority.promote_canary(&model_id, cap, actor).await;
            if let Err(GateError::NotApproved { .. }) = &result {
                eprintln!(
                    "Promotion needs founder approval: vote on proposal {}",
                    promotion_proposal_id(model_id.trim())
                );
            }
            let rollout = session.finish(result)?;
            println!(
                "✅ {} promoted to canary at {:.1}% of traffic ({})",
                rollout.model_id,
                rollout.cap_fraction * 100.0,
                format_timestamp(rollout.promoted_at)
            );
            println!("Apply reference: {}", rollout.receipt.reference);
        }
    }
    Ok(())
}
