use qa_cli::{build_traceability, TraceInput};

use super::{current_utc_rfc3339, CommandResult, Context, Failure};
use crate::TraceArgs;

pub fn run_trace(args: &TraceArgs, ctx: &Context) -> CommandResult {
    let corpus = ctx.corpus();
    let out_dir = match &args.out_dir {
        Some(dir) => ctx.project.root.join(dir),
        None => ctx.project.trace_out_dir(),
    };
    let generated_at = args.created_at.clone().unwrap_or_else(current_utc_rfc3339);

    let output = build_traceability(TraceInput {
        corpus: &corpus,
        out_dir,
        server_url: ctx.project.server_url(),
        generated_at,
    })
    .map_err(|err| err.to_string())?;

    if ctx.json {
        let json = serde_json::to_string(&output).map_err(|err| format!("json encode: {}", err))?;
        println!("{}", json);
    } else {
        println!("files={}", output.files);
        println!("rows={}", output.rows);
        println!("warnings={}", output.warnings.len());
        println!("csv_sha256={}", output.csv_sha256);
        println!("out_dir={}", output.out_dir.display());
    }

    if args.strict && !output.warnings.is_empty() {
        for warning in &output.warnings {
            eprintln!("[WARN] {}", warning);
        }
        return Err(Failure::StrictWarnings(format!(
            "traceability collected {} warning(s) in strict mode",
            output.warnings.len()
        )));
    }
    Ok(())
}
