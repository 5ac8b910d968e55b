use crate::error::{ReaperError, Result};
use crate::reference::ReferenceFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ActiveImageSet
// ---------------------------------------------------------------------------

/// Deduplicated `registry/repository:tag` references backing running tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveImageSet(BTreeSet<String>);

impl ActiveImageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the reference was not already present.
    pub fn insert(&mut self, reference: impl Into<String>) -> bool {
        self.0.insert(reference.into())
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.0.contains(reference)
    }

    /// Set union with another scope's references.
    pub fn merge(&mut self, other: ActiveImageSet) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ActiveImageSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// ActiveSource
// ---------------------------------------------------------------------------

/// One collection scope (an account/region pair, a cluster dump, ...).
pub trait ActiveSource {
    fn name(&self) -> &str;
    fn collect_active(&self) -> Result<ActiveImageSet>;
}

/// Collect every scope and union the results. Any scope failing aborts
/// collection: planning against a partial active set could delete live images.
pub fn collect_all(sources: &[Box<dyn ActiveSource>]) -> Result<ActiveImageSet> {
    let mut active = ActiveImageSet::new();
    for source in sources {
        let found = source.collect_active()?;
        tracing::info!(scope = source.name(), count = found.len(), "collected active images");
        for image in found.iter() {
            tracing::debug!(scope = source.name(), image, "active image");
        }
        active.merge(found);
    }
    Ok(active)
}

// ---------------------------------------------------------------------------
// FileActiveSource
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerDefinition {
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDefinition {
    #[serde(default)]
    container_definitions: Vec<ContainerDefinition>,
}

/// Shapes accepted in a JSON/YAML active-image file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActiveDocument {
    Images(Vec<String>),
    #[serde(rename_all = "camelCase")]
    Single {
        task_definition: TaskDefinition,
    },
    #[serde(rename_all = "camelCase")]
    Many {
        task_definitions: Vec<TaskDefinition>,
    },
}

impl ActiveDocument {
    fn into_images(self) -> Vec<String> {
        let from_defs = |defs: Vec<TaskDefinition>| {
            defs.into_iter()
                .flat_map(|d| d.container_definitions)
                .filter_map(|c| c.image)
                .collect()
        };
        match self {
            ActiveDocument::Images(images) => images,
            ActiveDocument::Single { task_definition } => from_defs(vec![task_definition]),
            ActiveDocument::Many { task_definitions } => from_defs(task_definitions),
        }
    }
}

/// Reads a scope's running images from a file exported by the cluster side.
///
/// `.json`, `.yaml` and `.yml` files hold a list of image strings or ECS task
/// definitions; anything else is one reference per line with `#` comments.
pub struct FileActiveSource {
    name: String,
    path: PathBuf,
    filter: ReferenceFilter,
}

impl FileActiveSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, filter: ReferenceFilter) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            filter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_images(&self) -> Result<Vec<String>> {
        let data = std::fs::read_to_string(&self.path)?;
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let doc: ActiveDocument = match ext.as_deref() {
            Some("json") => serde_json::from_str(&data)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&data)?,
            _ => return Ok(parse_lines(&data)),
        };
        Ok(doc.into_images())
    }
}

impl ActiveSource for FileActiveSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect_active(&self) -> Result<ActiveImageSet> {
        let images = self.read_images().map_err(|e| match e {
            ReaperError::Io(io) => ReaperError::Io(std::io::Error::new(
                io.kind(),
                format!("{}: {io}", self.path.display()),
            )),
            other => other,
        })?;

        let mut active = ActiveImageSet::new();
        for image in images {
            let image = image.trim();
            if self.filter.accepts(image) {
                active.insert(image);
            } else {
                tracing::debug!(scope = %self.name, image, "skipping untracked image");
            }
        }
        Ok(active)
    }
}

fn parse_lines(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const WEB_V1: &str = "123.dkr.ecr.us-east-1.amazonaws.com/web:v1";
    const WEB_V2: &str = "123.dkr.ecr.us-east-1.amazonaws.com/web:v2";

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn set_deduplicates_and_merges() {
        let mut a: ActiveImageSet = [WEB_V1, WEB_V1].into_iter().collect();
        assert_eq!(a.len(), 1);
        let b: ActiveImageSet = [WEB_V1, WEB_V2].into_iter().collect();
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert!(a.contains(WEB_V2));
    }

    #[test]
    fn reads_plain_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "active.txt",
            &format!("# prod cluster\n{WEB_V1}\n\n{WEB_V1}\nnginx:1.25\n"),
        );
        let source = FileActiveSource::new("prod", path, ReferenceFilter::ecr());
        let active = source.collect_active().unwrap();
        assert_eq!(active.iter().collect::<Vec<_>>(), vec![WEB_V1]);
    }

    #[test]
    fn reads_task_definition_json() {
        let dir = TempDir::new().unwrap();
        let body = serde_json::json!({
            "taskDefinition": {
                "family": "web",
                "containerDefinitions": [
                    { "name": "app", "image": WEB_V1 },
                    { "name": "sidecar", "image": "public.ecr.aws/xray/aws-xray-daemon:latest" },
                    { "name": "pinned", "image": "123.dkr.ecr.us-east-1.amazonaws.com/web@sha256:abc" }
                ]
            }
        });
        let path = write(&dir, "task.json", &body.to_string());
        let source = FileActiveSource::new("prod", path, ReferenceFilter::ecr());
        let active = source.collect_active().unwrap();
        assert_eq!(active.len(), 1);
        assert!(active.contains(WEB_V1));
    }

    #[test]
    fn reads_yaml_list_of_task_definitions() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "taskDefinitions:\n  - containerDefinitions:\n      - image: {WEB_V1}\n  - containerDefinitions:\n      - image: {WEB_V2}\n"
        );
        let path = write(&dir, "tasks.yaml", &body);
        let source = FileActiveSource::new("dev", path, ReferenceFilter::ecr());
        assert_eq!(source.collect_active().unwrap().len(), 2);
    }

    #[test]
    fn collect_all_unions_scopes() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.json", &serde_json::json!([WEB_V1]).to_string());
        let b = write(&dir, "b.json", &serde_json::json!([WEB_V1, WEB_V2]).to_string());
        let sources: Vec<Box<dyn ActiveSource>> = vec![
            Box::new(FileActiveSource::new("a", a, ReferenceFilter::ecr())),
            Box::new(FileActiveSource::new("b", b, ReferenceFilter::ecr())),
        ];
        let active = collect_all(&sources).unwrap();
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let sources: Vec<Box<dyn ActiveSource>> = vec![Box::new(FileActiveSource::new(
            "gone",
            dir.path().join("nope.txt"),
            ReferenceFilter::ecr(),
        ))];
        let err = collect_all(&sources).unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }
}
