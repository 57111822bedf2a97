use std::path::{Path, PathBuf};

use crate::config::ReferenceNaming;
use crate::core::{
    cancellation::CancellationToken, domain::Reference, errors::CompileError,
    extensions::to_ref_with,
};

/// Something that can be turned into reference images for a compile.
#[async_trait::async_trait]
pub trait CodeReference: std::fmt::Debug + Send + Sync {
    fn name(&self) -> String;

    fn location(&self) -> String;

    /// Whether the reference can currently be resolved.
    fn is_valid(&self) -> bool;

    async fn images(&self, cancel: &CancellationToken) -> Result<Vec<Reference>, CompileError>;
}

/// A reference assembly stored on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyReference {
    path: PathBuf,
    naming: ReferenceNaming,
}

impl AssemblyReference {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        AssemblyReference {
            path: path.as_ref().into(),
            naming: ReferenceNaming::default(),
        }
    }

    pub fn with_naming(mut self, naming: ReferenceNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl CodeReference for AssemblyReference {
    fn name(&self) -> String {
        let name = match self.naming {
            ReferenceNaming::FileStem => self.path.file_stem(),
            ReferenceNaming::FileName => self.path.file_name(),
        };
        name.map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn is_valid(&self) -> bool {
        self.path.is_file()
    }

    async fn images(&self, cancel: &CancellationToken) -> Result<Vec<Reference>, CompileError> {
        cancel.check()?;
        Ok(vec![to_ref_with(&self.path, self.naming).await?])
    }
}

/// A reference image already held in memory, e.g. a previous compile output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    name: String,
    body: Vec<u8>,
}

impl ImageReference {
    pub fn new(name: impl Into<String>, body: Vec<u8>) -> Self {
        ImageReference {
            name: name.into(),
            body,
        }
    }
}

impl From<Reference> for ImageReference {
    fn from(reference: Reference) -> Self {
        ImageReference::new(reference.name, reference.body)
    }
}

#[async_trait::async_trait]
impl CodeReference for ImageReference {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn location(&self) -> String {
        self.name.clone()
    }

    fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && !self.body.is_empty()
    }

    async fn images(&self, cancel: &CancellationToken) -> Result<Vec<Reference>, CompileError> {
        cancel.check()?;
        Ok(vec![Reference::new(self.name.clone(), self.body.clone())])
    }
}
