//! `citesync show` command.

use crate::config::Settings;
use crate::context::ServiceContext;
use crate::ledger::{self, LedgerFile, RecordLedger};

/// Execute the `show` command.
///
/// When `code` is provided, prints the record with the codes it cites and
/// the codes citing it. When no `code` is given, lists every code.
///
/// # Errors
///
/// Returns an error string if the ledger cannot be loaded or `code` is unknown.
pub fn run(ctx: &ServiceContext, settings: &Settings, code: Option<&str>) -> Result<(), String> {
    let (file, ledger) = ledger::open(ctx.fs.as_ref(), settings, ctx.clock.now()).map_err(|e| e.to_string())?;

    if let Some(code) = code {
        print!("{}", describe(&file, &ledger, code, &settings.ledger.missing).map_err(|e| e.to_string())?);
    } else if ledger.is_empty() {
        println!("No citations in {}.", file.path().display());
    } else {
        println!("Citations:");
        for code in ledger.codes() {
            println!("  {code}");
        }
        println!("\nUse `citesync show <CODE>` to view details.");
    }
    Ok(())
}

fn describe(file: &LedgerFile<'_>, ledger: &RecordLedger, code: &str, missing: &str) -> crate::error::Result<String> {
    let record = ledger.get(code)?;
    let mut out = String::new();
    for header in file.headers() {
        out.push_str(&format!("{header}: {}\n", record.get(header).to_cell(missing)));
    }
    for (label, codes) in [("Cites", ledger.codes_cited_by(code)?), ("Cited by", ledger.codes_citing(code)?)] {
        if !codes.is_empty() {
            out.push_str(&format!("{label}: {}\n", codes.join(", ")));
        }
    }
    Ok(out)
}
