use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::{fs, process::Command};
use uuid::Uuid;

use crate::core::{
    cancellation::CancellationToken,
    domain::{
        AnalyzerSettings, CompilationError, CompilationResult, ErrorType, Language, Location,
        Reference,
    },
    errors::{to_error, validate_inputs, CompileError},
    extensions::to_extension,
    traits::{Analyzer, Compiler},
};

pub const TOOLCHAIN_ERROR_ID: &str = "TOOLCHAIN";

pub const OUTPUT_PLACEHOLDER: &str = "{output}";
pub const SOURCES_PLACEHOLDER: &str = "{sources}";
pub const REFS_PLACEHOLDER: &str = "{refs}";

const OUTPUT_FILE: &str = "output.bin";
const REFS_DIR: &str = "refs";

/// Byte-compiles every source and marshals the code objects into the output
/// file. Prints `file:line:col: error: msg` for syntax errors.
const PYTHON_SCRIPT: &str = r#"import marshal, os, sys, warnings
out, paths = sys.argv[1], sys.argv[2:]
codes, failed = [], False
for path in paths:
    name = os.path.basename(path)
    with open(path, encoding="utf-8") as f:
        text = f.read()
    with warnings.catch_warnings(record=True) as caught:
        warnings.simplefilter("always")
        try:
            codes.append((name, compile(text, name, "exec")))
        except (SyntaxError, ValueError) as e:
            failed = True
            print(f"{name}:{getattr(e, 'lineno', None) or 1}:{getattr(e, 'offset', None) or 1}: error: {getattr(e, 'msg', e)}")
    for w in caught:
        print(f"{name}:{w.lineno or 1}: warning: {w.message}")
if failed:
    sys.exit(1)
with open(out, "wb") as f:
    marshal.dump(codes, f)
"#;

static DIAGNOSTIC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?P<file>[^\n:]+?):(?P<line>\d+):(?:(?P<col>\d+):)?[ \t]*(?P<severity>error|warning|note|info)(?:[ \t]+(?P<id>[A-Za-z]+\d+))?:[ \t]*(?P<message>.*)$",
    )
    .expect("diagnostic regex is valid")
});

/// Compiles by running an external toolchain in a scratch directory.
///
/// `args` may contain `{output}` (replaced inside an argument), and
/// `{sources}` / `{refs}` (each standing alone, expanded to the file list).
#[derive(Clone, Debug)]
pub struct ProcessCompiler {
    language: Language,
    program: PathBuf,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl ProcessCompiler {
    pub fn new<T, U>(language: Language, program: T, args: Vec<String>, work_dir: U) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        ProcessCompiler {
            language,
            program: program.as_ref().into(),
            args,
            work_dir: work_dir.as_ref().into(),
        }
    }

    pub fn python<T, U>(python_path: T, work_dir: U) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        let args = vec![
            "-c".to_string(),
            PYTHON_SCRIPT.to_string(),
            OUTPUT_PLACEHOLDER.to_string(),
            SOURCES_PLACEHOLDER.to_string(),
        ];
        Self::new(Language::Python, python_path, args, work_dir)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn expand_args(&self, output: &Path, sources: &[PathBuf], refs: &[PathBuf]) -> Vec<String> {
        let output = output.display().to_string();
        let paths = |list: &[PathBuf]| {
            list.iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
        };

        self.args
            .iter()
            .flat_map(|arg| match arg.as_str() {
                SOURCES_PLACEHOLDER => paths(sources),
                REFS_PLACEHOLDER => paths(refs),
                _ => vec![arg.replace(OUTPUT_PLACEHOLDER, &output)],
            })
            .collect()
    }

    async fn run_job(
        &self,
        job_dir: &Path,
        name: &str,
        sources: &[String],
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<CompilationResult, CompileError> {
        let refs_dir = job_dir.join(REFS_DIR);
        fs::create_dir_all(&refs_dir)
            .await
            .map_err(|e| CompileError::io(&refs_dir, &e))?;

        let source_paths = write_sources(job_dir, name, to_extension(self.language), sources).await?;
        let ref_paths = write_references(&refs_dir, references).await?;
        cancel.check()?;

        let output_path = job_dir.join(OUTPUT_FILE);
        let args = self.expand_args(&output_path, &source_paths, &ref_paths);

        let child = match Command::new(&self.program)
            .args(&args)
            .current_dir(job_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let msg = format!("Failed to start {}: {}", self.program.display(), e);
                tracing::error!("{}", msg);
                return Ok(CompilationResult::failed(vec![to_error(&msg)]));
            }
        };

        // Dropping the child on cancellation kills it.
        let out = tokio::select! {
            out = child.wait_with_output() => out.map_err(|e| CompileError::io(&self.program, &e))?,
            _ = cancel.cancelled() => {
                tracing::debug!("Toolchain process cancelled");
                return Err(CompileError::Cancelled);
            }
        };

        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        tracing::debug!("Toolchain exited with {}", out.status);

        let mut diagnostics = parse_diagnostics(&stdout, job_dir);
        diagnostics.extend(parse_diagnostics(&stderr, job_dir));

        let has_errors = diagnostics.iter().any(CompilationError::is_error);
        if !out.status.success() && !has_errors {
            diagnostics.push(CompilationError::error(
                TOOLCHAIN_ERROR_ID,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    out.status,
                    stderr.trim()
                ),
            ));
        }
        if !out.status.success() || has_errors {
            return Ok(CompilationResult::failed(diagnostics));
        }

        let image = fs::read(&output_path)
            .await
            .map_err(|e| CompileError::io(&output_path, &e))?;
        Ok(CompilationResult::new(diagnostics, Some(image)))
    }
}

async fn write_sources(
    dir: &Path,
    name: &str,
    extension: &str,
    sources: &[String],
) -> Result<Vec<PathBuf>, CompileError> {
    let mut paths = Vec::with_capacity(sources.len());
    for (i, source) in sources.iter().enumerate() {
        let file = if sources.len() == 1 {
            format!("{}{}", name, extension)
        } else {
            format!("{}_{}{}", name, i, extension)
        };
        let path = dir.join(file);
        fs::write(&path, source)
            .await
            .map_err(|e| CompileError::io(&path, &e))?;
        paths.push(path);
    }
    Ok(paths)
}

async fn write_references(
    dir: &Path,
    references: &[Reference],
) -> Result<Vec<PathBuf>, CompileError> {
    let mut paths = Vec::with_capacity(references.len());
    for reference in references {
        let name = reference.name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(CompileError::InvalidReference {
                name: reference.name.clone(),
                msg: "reference name must be a plain file name".to_string(),
            });
        }
        let path = dir.join(name);
        fs::write(&path, &reference.body)
            .await
            .map_err(|e| CompileError::io(&path, &e))?;
        paths.push(path);
    }
    Ok(paths)
}

/// Extracts `file:line[:col]: severity [ID]: message` lines from toolchain output.
pub fn parse_diagnostics(output: &str, job_dir: &Path) -> Vec<CompilationError> {
    let prefix = format!("{}/", job_dir.display());
    DIAGNOSTIC_REGEX
        .captures_iter(output)
        .map(|caps| {
            let file = caps["file"].trim();
            let file = file.strip_prefix(&prefix).unwrap_or(file);
            let line = caps["line"].parse().unwrap_or(1);
            let column = caps
                .name("col")
                .and_then(|c| c.as_str().parse().ok())
                .unwrap_or(1);
            let error_type = match &caps["severity"] {
                "error" => ErrorType::Error,
                "warning" => ErrorType::Warning,
                _ => ErrorType::Info,
            };
            let id = caps.name("id").map_or(TOOLCHAIN_ERROR_ID, |m| m.as_str());
            CompilationError::new(id, error_type, caps["message"].trim_end())
                .at(Location::new(file, line, column))
        })
        .collect()
}

#[async_trait::async_trait]
impl Compiler for ProcessCompiler {
    fn language(&self) -> Language {
        self.language
    }

    #[tracing::instrument(skip(self, sources, references, cancel))]
    async fn compile(
        &self,
        name: &str,
        sources: &[String],
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<CompilationResult, CompileError> {
        validate_inputs(name, sources)?;
        cancel.check()?;

        let job_dir = self.work_dir.join(format!("job_{}", Uuid::new_v4()));
        tracing::debug!(
            "Start {} compilation in {}",
            self.language,
            job_dir.display()
        );

        let outcome = self
            .run_job(&job_dir, name, sources, references, cancel)
            .await;

        if let Err(e) = fs::remove_dir_all(&job_dir).await {
            tracing::warn!("Failed to remove {}: {}", job_dir.display(), e);
        }

        match outcome {
            Err(e @ CompileError::Io { .. }) => {
                tracing::error!("Toolchain I/O failure: {}", e);
                Ok(CompilationResult::failed(vec![to_error(&e)]))
            }
            other => other,
        }
    }

    async fn analyse(
        &self,
        _analyzer: Arc<dyn Analyzer>,
        _settings: &[AnalyzerSettings],
        _name: &str,
        _sources: &[String],
        _references: &[Reference],
        _cancel: &CancellationToken,
    ) -> Result<Vec<CompilationError>, CompileError> {
        Err(CompileError::NotSupported(format!(
            "{} backend has no semantic model to analyse",
            self.language
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::HOST_ERROR_ID;
    use std::time::Duration;

    const FAKE_TOOLCHAIN: &str = r#"out="$1"; shift
status=0
for f in "$@"; do
  n=$(basename "$f")
  if grep -q BROKEN "$f"; then echo "$n:1:5: error E100: broken source"; status=1; fi
  if grep -q SHAKY "$f"; then echo "$f:2: warning: shaky source" >&2; fi
done
if [ $status -eq 0 ]; then cat "$@" > "$out"; fi
exit $status
"#;

    fn work_dir() -> PathBuf {
        std::env::temp_dir().join(format!("dyncompile_process_{}", Uuid::new_v4()))
    }

    fn shell_compiler(script: &str, work_dir: &Path) -> ProcessCompiler {
        let args = vec![
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
            OUTPUT_PLACEHOLDER.to_string(),
            SOURCES_PLACEHOLDER.to_string(),
        ];
        ProcessCompiler::new(Language::Python, "/bin/sh", args, work_dir)
    }

    async fn job_dirs_left(work_dir: &Path) -> usize {
        let mut count = 0;
        if let Ok(mut entries) = fs::read_dir(work_dir).await {
            while let Ok(Some(_)) = entries.next_entry().await {
                count += 1;
            }
        }
        count
    }

    fn has_python() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    #[tokio::test]
    async fn test_compile_success() {
        let dir = work_dir();
        let compiler = shell_compiler(FAKE_TOOLCHAIN, &dir);

        let result = compiler
            .compile("test", &["print(1)\n".to_string()], &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.errors.is_empty(), "{}", result.summary());
        assert_eq!(result.assembly(), Some(&b"print(1)\n"[..]));
        assert_eq!(job_dirs_left(&dir).await, 0);

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_compile_reports_diagnostics() {
        let dir = work_dir();
        let compiler = shell_compiler(FAKE_TOOLCHAIN, &dir);

        let result = compiler
            .compile(
                "test",
                &["ok = 1\nSHAKY\n".to_string(), "BROKEN\n".to_string()],
                &[],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(result.image.is_none());
        assert_eq!(result.errors.len(), 2, "{}", result.summary());
        let error = &result.errors[0];
        assert_eq!(error.id, "E100");
        assert_eq!(error.error_type, ErrorType::Error);
        assert_eq!(error.message, "broken source");
        assert_eq!(error.location, Some(Location::new("test_1.py", 1, 5)));

        let warning = &result.errors[1];
        assert_eq!(warning.error_type, ErrorType::Warning);
        assert_eq!(warning.location, Some(Location::new("test_0.py", 2, 1)));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_diagnostics() {
        let dir = work_dir();
        let compiler = shell_compiler("echo 'segfault' >&2; exit 3", &dir);

        let result = compiler
            .compile("test", &["x".to_string()], &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.image.is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].id, TOOLCHAIN_ERROR_ID);
        assert!(result.errors[0].message.contains("segfault"));

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_references_are_written() {
        let dir = work_dir();
        let script = r#"out="$1"; shift; cat "$@" > "$out""#;
        let args = vec![
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
            OUTPUT_PLACEHOLDER.to_string(),
            REFS_PLACEHOLDER.to_string(),
        ];
        let compiler = ProcessCompiler::new(Language::Python, "/bin/sh", args, &dir);

        let result = compiler
            .compile(
                "test",
                &["x".to_string()],
                &[Reference::new("dep", b"DEP".to_vec())],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.assembly(), Some(&b"DEP"[..]));

        let invalid = compiler
            .compile(
                "test",
                &["x".to_string()],
                &[Reference::new("../escape", b"x".to_vec())],
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(invalid, Err(CompileError::InvalidReference { .. })));
        assert_eq!(job_dirs_left(&dir).await, 0);

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = work_dir();
        let compiler = ProcessCompiler::new(Language::Python, "/nonexistent/toolchain", Vec::new(), &dir);

        let result = compiler
            .compile("test", &["x".to_string()], &[], &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.image.is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].id, HOST_ERROR_ID);

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let dir = work_dir();
        let compiler = shell_compiler("sleep 10", &dir);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            compiler.compile("test", &["x".to_string()], &[], &cancel),
        )
        .await
        .expect("compile should stop once cancelled");
        canceller.await.unwrap();

        assert_eq!(result, Err(CompileError::Cancelled));
        assert_eq!(job_dirs_left(&dir).await, 0);

        let _ = fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn test_precancelled_and_invalid_inputs() {
        let dir = work_dir();
        let compiler = shell_compiler(FAKE_TOOLCHAIN, &dir);

        let result = compiler
            .compile("test", &["x".to_string()], &[], &CancellationToken::cancelled_token())
            .await;
        assert_eq!(result, Err(CompileError::Cancelled));

        let result = compiler
            .compile("", &["x".to_string()], &[], &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CompileError::InvalidArgument { .. })));
    }

    #[tokio::test]
    async fn test_unit_name_cannot_leave_work_dir() {
        let base = work_dir();
        let dir = base.join("work");
        let compiler = shell_compiler(FAKE_TOOLCHAIN, &dir);

        let result = compiler
            .compile("../../escaped", &["x".to_string()], &[], &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CompileError::InvalidArgument { .. })));
        assert!(!base.join("escaped.py").exists());
        assert_eq!(job_dirs_left(&dir).await, 0);

        let _ = fs::remove_dir_all(&base).await;
    }

    #[tokio::test]
    async fn test_analyse_not_supported() {
        let compiler = ProcessCompiler::python("python3", work_dir());
        let (analyzer, settings) =
            crate::analyzers::to_banned_symbols_analyzer("T:System.Object;no");

        let result = compiler
            .analyse(
                analyzer,
                &[settings],
                "test",
                &["x = 1".to_string()],
                &[],
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(CompileError::NotSupported(_))));
    }

    #[test]
    fn test_parse_diagnostics() {
        let job = Path::new("/tmp/job_1");
        let output = "/tmp/job_1/main.py:3:7: error: invalid syntax\nnoise line\nlib.c:10: warning W12: unused\nx.py:1:1: note: see here\n";
        let diagnostics = parse_diagnostics(output, job);

        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics[0].location, Some(Location::new("main.py", 3, 7)));
        assert_eq!(diagnostics[0].id, TOOLCHAIN_ERROR_ID);
        assert_eq!(diagnostics[0].message, "invalid syntax");
        assert_eq!(diagnostics[1].id, "W12");
        assert_eq!(diagnostics[1].error_type, ErrorType::Warning);
        assert_eq!(diagnostics[1].location, Some(Location::new("lib.c", 10, 1)));
        assert_eq!(diagnostics[2].error_type, ErrorType::Info);
    }

    #[tokio::test]
    async fn test_python_preset() {
        if !has_python() {
            tracing::warn!("python3 not available, skipping");
            return;
        }
        let dir = work_dir();
        let compiler = ProcessCompiler::python("python3", &dir);

        let ok = compiler
            .compile("test", &["x = 1\nprint(x)\n".to_string()], &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(!ok.errors.iter().any(CompilationError::is_error), "{}", ok.summary());
        assert!(ok.assembly().is_some_and(|image| !image.is_empty()));

        let broken = compiler
            .compile("test", &["def f(:\n    pass\n".to_string()], &[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(broken.image.is_none());
        let error = broken
            .errors
            .iter()
            .find(|e| e.is_error())
            .expect("syntax error reported");
        assert_eq!(error.location.as_ref().map(|l| l.file.as_str()), Some("test.py"));
        assert_eq!(error.location.as_ref().map(|l| l.line), Some(1));

        let _ = fs::remove_dir_all(&dir).await;
    }
}
