//! Resource naming - pipeline runs, task roots and remote jobs
//!
//! Task roots live at `{pipeline_root}/{pipeline_resource}/{task_dir}`.
//! The task dir nests one path segment per DAG level and iteration index,
//! so two tasks in one run never share a directory.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// `{pipeline-name}-{YYYY-MM-DD-HH-MM-SS-ffffff}`
pub fn pipeline_resource_name(pipeline_name: &str, at: DateTime<Local>) -> String {
    format!("{}-{}", pipeline_name, at.format("%Y-%m-%d-%H-%M-%S-%6f"))
}

/// `{task}` for plain tasks, `{task}-{index}` for iteration instances
///
/// `prefix` is the resource of the enclosing DAG task, if any. This is the
/// value of `{{$.pipeline_task_name}}`; directories use [`task_dir`].
pub fn task_resource_name(prefix: Option<&str>, task: &str, index: Option<usize>) -> String {
    let base = match index {
        Some(i) => format!("{task}-{i}"),
        None => task.to_string(),
    };
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}-{base}"),
        _ => base,
    }
}

/// Relative task directory: `{parent}/{task}` or `{parent}/{task}/{index}`
///
/// Task names never contain `/`, so distinct tasks get distinct directories
/// even when the flat resource names collide (`gen` #2 and `gen-2`).
pub fn task_dir(parent: Option<&str>, task: &str, index: Option<usize>) -> String {
    let base = match index {
        Some(i) => format!("{task}/{i}"),
        None => task.to_string(),
    };
    match parent {
        Some(p) if !p.is_empty() => format!("{p}/{base}"),
        _ => base,
    }
}

/// Dotted path through nested DAGs, `[i]` for iteration instances
pub fn qualified_name(parent: Option<&str>, task: &str, index: Option<usize>) -> String {
    let base = match index {
        Some(i) => format!("{task}[{i}]"),
        None => task.to_string(),
    };
    match parent {
        Some(p) if !p.is_empty() => format!("{p}.{base}"),
        _ => base,
    }
}

pub fn task_root(pipeline_root: &Utf8Path, pipeline_resource: &str, task_dir: &str) -> Utf8PathBuf {
    pipeline_root.join(pipeline_resource).join(task_dir)
}

/// Lowercase alphanumeric id of `len` chars
pub fn random_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

/// Remote job id: `job-xxxx`
pub fn job_id() -> String {
    format!("job-{}", random_id(4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn pipeline_resource_has_microseconds() {
        let at = Local
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .unwrap()
            + chrono::Duration::microseconds(42);
        assert_eq!(
            pipeline_resource_name("my-pipeline", at),
            "my-pipeline-2024-01-02-03-04-05-000042"
        );
    }

    #[test]
    fn task_resources_are_disjoint() {
        assert_eq!(task_resource_name(None, "train", None), "train");
        assert_eq!(task_resource_name(None, "train", Some(2)), "train-2");
        assert_eq!(task_resource_name(Some("outer"), "train", Some(0)), "outer-train-0");
        assert_ne!(
            task_resource_name(None, "t", Some(1)),
            task_resource_name(None, "t", Some(2))
        );
    }

    #[test]
    fn task_dirs_do_not_collide_with_hyphenated_siblings() {
        assert_eq!(task_dir(None, "gen", Some(2)), "gen/2");
        assert_eq!(task_dir(Some("outer"), "train", None), "outer/train");
        assert_ne!(task_dir(None, "gen", Some(2)), task_dir(None, "gen-2", None));
        assert_ne!(task_dir(Some("a"), "b-c", None), task_dir(Some("a-b"), "c", None));
        // Flat resource names do collide; they only feed `pipeline_task_name`
        assert_eq!(
            task_resource_name(None, "gen", Some(2)),
            task_resource_name(None, "gen-2", None)
        );
    }

    #[test]
    fn qualified_names_use_dots_and_brackets() {
        assert_eq!(qualified_name(None, "a", None), "a");
        assert_eq!(qualified_name(Some("loop[1]"), "inner", None), "loop[1].inner");
        assert_eq!(qualified_name(Some("outer"), "t", Some(3)), "outer.t[3]");
    }

    #[test]
    fn job_ids_are_lowercase() {
        let id = job_id();
        assert!(id.starts_with("job-"));
        assert_eq!(id.len(), 8);
        assert!(id[4..].chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn task_root_joins_segments() {
        let root = task_root(Utf8Path::new("/tmp/out"), "p-1", "a");
        assert_eq!(root.as_str(), "/tmp/out/p-1/a");
        let nested = task_root(Utf8Path::new("/tmp/out"), "p-1", &task_dir(Some("a"), "b", Some(0)));
        assert_eq!(nested.as_str(), "/tmp/out/p-1/a/b/0");
    }
}
