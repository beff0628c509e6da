//! Command handlers.

use console::style;
use forge_core::context::{EventKind, PipelineContext};
use forge_core::RunId;
use forge_core::pipeline::PipelineDefinition;
use forge_core::ports::ReleaseHost;
use forge_core::run::{JobStatus, PublishOutcome, RunStatus, RunSummary};
use forge_engine::{PipelineDag, PipelineExecutor};
use forge_publish::HttpReleaseHost;
use forge_store::FilesystemStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const PIPELINE_CANDIDATES: &[&str] = &[
    ".forge/pipeline.yaml",
    ".forge/pipeline.yml",
    "forge.yaml",
    "forge.yml",
];

fn find_pipeline_file(path: Option<&str>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("pipeline file not found: {}", path.display()).into());
        }
        return Ok(path);
    }
    PIPELINE_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            format!(
                "no pipeline file found (looked for {})",
                PIPELINE_CANDIDATES.join(", ")
            )
            .into()
        })
}

fn load_pipeline(path: &Path) -> Result<PipelineDefinition, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let definition: PipelineDefinition = serde_yaml::from_str(&content)?;
    Ok(definition)
}

/// Validate a pipeline definition, including cycle detection.
pub fn validate(path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let path = find_pipeline_file(path)?;
    let definition = load_pipeline(&path)?;
    let dag = PipelineDag::build(&definition)?;

    println!(
        "{} Pipeline \"{}\" is valid",
        style("✓").green(),
        definition.name
    );
    println!("  Jobs ({}):", definition.jobs.len());
    for name in dag.topological_order() {
        let job = definition.job(name).ok_or("job missing after validation")?;
        let mut notes = Vec::new();
        if !job.needs.is_empty() {
            notes.push(format!("needs {}", job.needs.join(", ")));
        }
        if let Some(condition) = &job.condition {
            notes.push(format!("if {condition}"));
        }
        if job.publish {
            notes.push("publish".to_string());
        }
        if notes.is_empty() {
            println!("    - {name}");
        } else {
            println!("    - {name} ({})", notes.join("; "));
        }
    }
    if let Some(release) = &definition.release {
        println!(
            "  Release: tag \"{}\", {} asset(s)",
            release.tag,
            release.assets.len()
        );
    }
    Ok(())
}

/// Execute a run; returns whether it succeeded.
pub async fn run_pipeline(
    pipeline: Option<&str>,
    git_ref: &str,
    event: &str,
    workspace: Option<&str>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let path = find_pipeline_file(pipeline)?;
    let definition = load_pipeline(&path)?;
    let event: EventKind = event.parse()?;
    let ctx = PipelineContext::new(git_ref, event);

    let workspace_root = workspace
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".forge/workspace"));
    // Artifacts are write-once per (job, name), so each invocation gets its
    // own directory under the workspace.
    let run_root = workspace_root.join(RunId::new().to_string());
    std::fs::create_dir_all(&run_root)?;
    let store = Arc::new(FilesystemStore::new(run_root.join("artifacts")));

    let host = release_host_from_env(&definition);

    println!(
        "{} Running \"{}\" for {} on {}",
        style("▶").cyan(),
        style(&definition.name).bold(),
        style(event.as_str()).dim(),
        style(git_ref).dim()
    );

    let executor = PipelineExecutor::new(definition, store, run_root.join("jobs"), host)?;
    let summary = executor.run(&ctx).await;
    print_summary(&summary);
    Ok(summary.succeeded())
}

fn release_host_from_env(definition: &PipelineDefinition) -> Option<Arc<dyn ReleaseHost>> {
    if definition.release.is_none() {
        return None;
    }
    let Ok(base_url) = std::env::var("FORGE_RELEASE_API") else {
        warn!("pipeline declares a release but FORGE_RELEASE_API is not set");
        return None;
    };
    let token = std::env::var("FORGE_RELEASE_TOKEN").ok();
    if token.is_none() {
        warn!("FORGE_RELEASE_TOKEN is not set; publishing unauthenticated");
    }
    Some(Arc::new(HttpReleaseHost::new(base_url, token)))
}

fn print_summary(summary: &RunSummary) {
    for result in summary.jobs.values() {
        match result.status {
            JobStatus::Succeeded => {
                println!(
                    "{} {} ({} ms)",
                    style("✓").green(),
                    result.job,
                    result.duration_ms
                );
            }
            JobStatus::Failed => {
                println!("{} {}", style("✗").red(), result.job);
                if let Some(failure) = &result.failure {
                    println!("    {failure}");
                }
                if let Some(step) = result.steps.iter().find(|s| !s.success()) {
                    println!("    step \"{}\" exited with {}", step.name, step.exit_code);
                    if !step.stderr.is_empty() {
                        for line in step.stderr.lines() {
                            println!("    {}", style(line).dim());
                        }
                    }
                }
            }
            JobStatus::Skipped => {
                let reason = result
                    .skip_reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                println!("{} {} ({})", style("→").yellow(), result.job, reason);
            }
        }
    }

    match &summary.publish {
        Some(PublishOutcome::Published(published)) => {
            let verb = if published.replaced_existing {
                "replaced"
            } else {
                "created"
            };
            println!(
                "{} Release \"{}\" {} ({} asset(s) uploaded)",
                style("✓").green(),
                published.tag,
                verb,
                published.assets_uploaded
            );
        }
        Some(PublishOutcome::Skipped { reason }) => {
            println!("{} Publish skipped ({reason})", style("→").yellow());
        }
        Some(PublishOutcome::Failed { message, retryable }) => {
            println!("{} Publish failed: {message}", style("✗").red());
            if *retryable {
                println!("    Transient failure; re-run to retry");
            }
        }
        None => {}
    }

    match summary.status {
        RunStatus::Succeeded => {
            println!(
                "{} Run {} succeeded in {} ms",
                style("✓").green(),
                summary.run_id,
                summary.duration_ms
            );
        }
        RunStatus::Failed => {
            println!(
                "{} Run {} failed after {} ms",
                style("✗").red(),
                summary.run_id,
                summary.duration_ms
            );
        }
    }
}

/// Print the JSON schema for pipeline files.
pub fn schema() -> Result<(), Box<dyn std::error::Error>> {
    let schema = schemars::schema_for!(PipelineDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pipeline(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_validate_accepts_good_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pipeline(
            dir.path(),
            "forge.yaml",
            r#"
version: "1"
name: demo
jobs:
  - name: build
    steps:
      - name: compile
        run: echo ok
"#,
        );
        assert!(validate(path.to_str()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_condition() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pipeline(
            dir.path(),
            "forge.yaml",
            r#"
version: "1"
name: demo
jobs:
  - name: build
    condition: branch == "main"
    steps:
      - name: compile
        run: echo ok
"#,
        );
        assert!(validate(path.to_str()).is_err());
    }

    #[test]
    fn test_missing_pipeline_file_reported() {
        let err = find_pipeline_file(Some("/nonexistent/forge.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
