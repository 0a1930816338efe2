//! Verify command - look up an admission number in the school registry

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use shelf_core::services::{LookupOutcome, VerifiedStudent};
use shelf_core::ShelfContext;

use super::{get_context, require_session, runtime};
use crate::output;

/// Run one supervised lookup on a short-lived runtime
pub fn lookup(ctx: &ShelfContext, admission_number: &str) -> Result<LookupOutcome> {
    let rt = runtime()?;
    Ok(rt.block_on(ctx.verification.lookup(admission_number))?)
}

pub fn print_verified(verified: &VerifiedStudent) {
    let record = &verified.record;
    println!("{} {}", "✓".green(), record.name.bold());
    println!("  Admission No.: {}", record.admission_number);
    println!("  Grade: {}", record.grade);
    println!("  Status: {:?}", record.status);
}

pub fn run(admission_number: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    require_session(&ctx)?;

    let outcome = lookup(&ctx, admission_number)?;

    if json {
        let value = match &outcome {
            LookupOutcome::Verified(v) => json!({ "status": "verified", "student": v }),
            LookupOutcome::NotFound => json!({ "status": "not_found" }),
            LookupOutcome::Superseded => json!({ "status": "superseded" }),
            LookupOutcome::Disabled => json!({ "status": "disabled" }),
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match outcome {
        LookupOutcome::Verified(v) => print_verified(&v),
        LookupOutcome::NotFound => {
            output::error("The school registry has no student with this admission number");
        }
        LookupOutcome::Superseded => output::warning("Lookup was superseded; try again"),
        LookupOutcome::Disabled => {
            output::info("Registry verification is disabled (registry.enabled in settings.json)");
        }
    }
    Ok(())
}
