//! Lint command implementations

use qa_cli::{run_corpus_lint, CorpusLintOptions};
use qa_core::{count_by_severity, LintFinding};
use qa_scope_cases::{ensure_front_matter, lint_with_registry};

use super::{input_label, read_input, CommandResult, Context};
use crate::{LintArgs, LintCorpusArgs};

const MAX_PRINTED_FINDINGS: usize = 200;

pub fn run_lint(args: &LintArgs, ctx: &Context) -> CommandResult {
    let raw = read_input(&args.input)?;
    let registry = ctx.project.load_registry().map_err(|err| err.to_string())?;
    let label = input_label(&args.input);

    let draft = ensure_front_matter(&raw);
    let result = lint_with_registry(&draft, &registry);
    let findings = result.findings(&label);
    let (errors, warnings) = count_by_severity(&findings);

    if let (Some(path), Some(text)) = (&args.write, &result.normalized_document) {
        std::fs::write(path, text).map_err(|err| format!("write {}: {}", path.display(), err))?;
    }

    if ctx.json {
        let normalized = if args.write.is_some() || args.quiet {
            None
        } else {
            result.normalized_document.as_deref()
        };
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "path": label,
            "errors": errors,
            "warnings": warnings,
            "malformed": result.is_malformed(),
            "findings": findings,
            "written": args.write,
            "normalized_document": normalized,
        }))
        .map_err(|err| format!("json encode: {}", err))?;
        println!("{}", json);
    } else {
        // Findings go to stderr so stdout can be piped as the normalized draft.
        for finding in &findings {
            eprintln!(
                "[{}] {}: {}",
                finding.severity.as_str(),
                finding.rule_id,
                finding.message
            );
        }
        match (&args.write, &result.normalized_document) {
            (Some(path), Some(_)) => {
                println!("errors={}", errors);
                println!("warnings={}", warnings);
                println!("written={}", path.display());
            }
            (None, Some(text)) if !args.quiet => print!("{}", text),
            _ => {}
        }
    }

    if result.is_malformed() {
        return Err(format!("{}: draft is malformed and cannot be normalized", label).into());
    }
    if errors > 0 {
        return Err(format!("{}: {} error finding(s)", label, errors).into());
    }
    Ok(())
}

pub fn run_lint_corpus(args: &LintCorpusArgs, ctx: &Context) -> CommandResult {
    let registry = ctx.project.load_registry().map_err(|err| err.to_string())?;
    let policy = ctx.policy(args.scope.scope_override(), None);
    let corpus = ctx.corpus();
    let output = run_corpus_lint(
        &corpus,
        &registry,
        CorpusLintOptions {
            scope: policy.scope,
        },
    )
    .map_err(|err| err.to_string())?;

    if ctx.json {
        let json = serde_json::to_string(&serde_json::json!({
            "corpus": corpus.root(),
            "scope": policy.scope.as_str(),
            "output": &output,
        }))
        .map_err(|err| format!("json encode: {}", err))?;
        println!("{}", json);
    } else {
        println!("corpus={}", corpus.root().display());
        println!("scope={}", policy.scope.as_str());
        println!("files_scanned={}", output.files_scanned);
        println!("errors={}", output.errors);
        println!("warnings={}", output.warnings);
        println!("passed={}", output.passed);
        print_findings(&output.findings);
    }

    if output.passed {
        Ok(())
    } else {
        Err(format!("corpus lint found {} error(s)", output.errors).into())
    }
}

fn print_findings(findings: &[LintFinding]) {
    for finding in findings.iter().take(MAX_PRINTED_FINDINGS) {
        println!(
            "finding rule_id={} severity={} path={} message={}",
            finding.rule_id,
            finding.severity.as_str(),
            finding.path,
            finding.message
        );
    }
    if findings.len() > MAX_PRINTED_FINDINGS {
        println!(
            "finding_truncated=true shown={} total={}",
            MAX_PRINTED_FINDINGS,
            findings.len()
        );
    }
}
