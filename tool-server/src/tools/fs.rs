//! `fs.read` and `fs.write`.

use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::ToolContext;
use crate::envelope::Envelope;
use crate::guard::resolve;
use crate::registry::{ParamType, Tool, ToolSpec, str_arg};

/// Read a UTF-8 file under the project root. Unguarded.
pub struct ReadFile {
    ctx: Arc<ToolContext>,
}

impl ReadFile {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

impl Tool for ReadFile {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("fs.read", "Read UTF-8 text file").required("path", ParamType::String)
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope> {
        let path = resolve(&self.ctx.project_path(str_arg(args, "path")?));
        let shown = path.display().to_string();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %shown, "read target missing");
                return Ok(Envelope::failure("not_found").with("path", shown));
            }
            Err(err) if path.is_dir() => {
                debug!(path = %shown, err = %err, "read target is a directory");
                return Ok(Envelope::failure("not_a_file").with("path", shown));
            }
            Err(err) => return Err(err).with_context(|| format!("read {shown}")),
        };

        match String::from_utf8(bytes) {
            Ok(content) => Ok(Envelope::success().with("content", content)),
            Err(_) => Ok(Envelope::failure("not_utf8").with("path", shown)),
        }
    }
}

/// Overwrite a file inside the allow-listed roots.
///
/// Not atomic: a concurrent reader may observe a partially written file.
pub struct WriteFile {
    ctx: Arc<ToolContext>,
}

impl WriteFile {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

impl Tool for WriteFile {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("fs.write", "Write UTF-8 text file (allow-listed paths only)")
            .required("path", ParamType::String)
            .required("content", ParamType::String)
    }

    fn invoke(&self, args: &Map<String, Value>) -> Result<Envelope> {
        let path = resolve(&self.ctx.project_path(str_arg(args, "path")?));
        let content = str_arg(args, "content")?;
        let shown = path.display().to_string();

        if !self.ctx.guard.is_allowed(&path) {
            warn!(path = %shown, "write outside allow-listed roots");
            return Ok(Envelope::failure("write_not_allowed").with("path", shown));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {shown}"))?;
        debug!(path = %shown, bytes = content.len(), "file written");
        Ok(Envelope::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use serde_json::json;
    use std::path::Path;

    fn ctx(root: &Path) -> Arc<ToolContext> {
        Arc::new(ToolContext::new(ServerConfig {
            project_root: root.to_path_buf(),
            ..ServerConfig::default()
        }))
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("args must be an object"),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx(temp.path());
        let content = "def hello():\n    return \"héllo\"\n";

        let written = WriteFile::new(ctx.clone())
            .invoke(&args(json!({"path": "src/pkg/app.py", "content": content})))
            .expect("write");
        assert!(written.ok);

        let read = ReadFile::new(ctx)
            .invoke(&args(json!({"path": "src/pkg/app.py"})))
            .expect("read");
        assert!(read.ok);
        assert_eq!(read.get_str("content"), Some(content));
    }

    #[test]
    fn write_overwrites_entire_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = ctx(temp.path());
        let tool = WriteFile::new(ctx);
        tool.invoke(&args(json!({"path": "docs/a.md", "content": "long long text"})))
            .expect("first write");
        tool.invoke(&args(json!({"path": "docs/a.md", "content": "short"})))
            .expect("second write");
        let on_disk = fs::read_to_string(temp.path().join("docs/a.md")).expect("read");
        assert_eq!(on_disk, "short");
    }

    #[test]
    fn write_outside_roots_is_refused_without_side_effects() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tool = WriteFile::new(ctx(temp.path()));

        for path in ["README.md", "src/../README.md", "../escape.txt", "src2/x.py"] {
            let env = tool
                .invoke(&args(json!({"path": path, "content": "x"})))
                .expect("write");
            assert!(!env.ok, "{path} should be refused");
            assert_eq!(env.error(), Some("write_not_allowed"));
        }
        assert!(!temp.path().join("README.md").exists());
        assert!(!temp.path().join("src2").exists());
        assert!(
            !temp
                .path()
                .parent()
                .expect("parent")
                .join("escape.txt")
                .exists()
        );
    }

    #[test]
    fn read_missing_is_not_found_and_creates_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let env = ReadFile::new(ctx(temp.path()))
            .invoke(&args(json!({"path": "src/missing.py"})))
            .expect("read");
        assert!(!env.ok);
        assert_eq!(env.error(), Some("not_found"));
        assert!(!temp.path().join("src").exists());
    }

    #[test]
    fn read_binary_is_not_utf8() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("blob.bin"), [0xff, 0xfe, 0x00, 0x81]).expect("write blob");
        let env = ReadFile::new(ctx(temp.path()))
            .invoke(&args(json!({"path": "blob.bin"})))
            .expect("read");
        assert_eq!(env.error(), Some("not_utf8"));
    }

    #[test]
    fn read_is_not_guarded() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("README.md"), "# hi\n").expect("write readme");
        let env = ReadFile::new(ctx(temp.path()))
            .invoke(&args(json!({"path": "README.md"})))
            .expect("read");
        assert_eq!(env.get_str("content"), Some("# hi\n"));
    }
}
