//! Identifier commands: non-binding suggestion and allocating persist.

use qa_cli::{persist_case, Allocator, PersistError, PersistRequest};
use qa_core::count_by_severity;

use super::{read_input, CommandResult, Context, Failure};
use crate::{AllocateArgs, SuggestIdArgs};

pub fn run_suggest_id(args: &SuggestIdArgs, ctx: &Context) -> CommandResult {
    let corpus = ctx.corpus();
    let policy = ctx.policy(args.scope.scope_override(), None);
    let suggested = Allocator::new(&corpus, policy)
        .peek_next(&args.app, args.area.as_deref())
        .map_err(|err| err.to_string())?;

    if ctx.json {
        let json = serde_json::to_string(&serde_json::json!({
            "app": args.app,
            "area": args.area,
            "scope": policy.scope.as_str(),
            "suggested_id": suggested,
            "reserved": false,
        }))
        .map_err(|err| format!("json encode: {}", err))?;
        println!("{}", json);
    } else {
        println!("suggested_id={}", suggested);
        println!("scope={}", policy.scope.as_str());
        println!("reserved=false");
    }
    Ok(())
}

pub fn run_allocate(args: &AllocateArgs, ctx: &Context) -> CommandResult {
    let raw = read_input(&args.input)?;
    let registry = ctx.project.load_registry().map_err(|err| err.to_string())?;
    let corpus = ctx.corpus();
    let policy = ctx.policy(args.scope.scope_override(), args.max_attempts);

    let outcome = persist_case(
        &corpus,
        &registry,
        policy,
        PersistRequest {
            markdown: &raw,
            app: args.app.as_deref(),
            area: args.area.as_deref(),
            preferred_id: args.preferred_id.as_deref(),
            strict: args.strict,
        },
    )
    .map_err(|err| match err {
        err @ PersistError::Alloc(_) if err.is_retryable() => Failure::Retryable(err.to_string()),
        err => Failure::Error(err.to_string()),
    })?;

    let findings = outcome.findings();
    let (errors, warnings) = count_by_severity(&findings);
    if ctx.json {
        let json = serde_json::to_string(&serde_json::json!({
            "id": outcome.id,
            "path": outcome.rel_path,
            "corpus": corpus.root(),
            "attempts": outcome.attempts,
            "errors": errors,
            "warnings": warnings,
            "findings": findings,
        }))
        .map_err(|err| format!("json encode: {}", err))?;
        println!("{}", json);
    } else {
        println!("id={}", outcome.id);
        println!("path={}", corpus.absolute(&outcome.rel_path).display());
        println!("attempts={}", outcome.attempts);
        println!("errors={}", errors);
        println!("warnings={}", warnings);
        for finding in &findings {
            println!(
                "finding rule_id={} severity={} message={}",
                finding.rule_id,
                finding.severity.as_str(),
                finding.message
            );
        }
    }
    Ok(())
}
