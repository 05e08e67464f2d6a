use super::context::{start_logging, Paths};
use quorate::audit::{
    format_audit_log, query_audit_log, verify_chain, AuditEventType, AuditQuery, JsonlAuditSink,
};

pub struct AuditArgs {
    pub event_type: Option<String>,
    pub actor: Option<String>,
    pub entity: Option<String>,
    pub failures: bool,
    pub limit: usize,
    pub verify: bool,
}

pub fn execute(paths: &Paths, args: AuditArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = paths.load_config()?;
    start_logging(&config);

    let log_path = &config.storage.audit_log;
    let records = if log_path.exists() {
        JsonlAuditSink::read_all(log_path)?
    } else {
        Vec::new()
    };

    if args.verify {
        verify_chain(&records)?;
        println!(
            "✅ Audit chain intact ({} records in {})",
            records.len(),
            log_path.display()
        );
        return Ok(());
    }

    let query = AuditQuery {
        event_type: args
            .event_type
            .map(|s| s.parse::<AuditEventType>())
            .transpose()?,
        actor: args.actor,
        entity_id: args.entity,
        failures_only: args.failures,
        after_timestamp: None,
        limit: Some(args.limit),
    };

    println!("{}", format_audit_log(&query_audit_log(&records, &query)));
    Ok(())
}
