use std::fmt;

use itertools::Itertools;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    CSharp,
    VisualBasic,
    FSharp,
    Python,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::CSharp,
        Language::VisualBasic,
        Language::FSharp,
        Language::Python,
    ];
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::CSharp => "CSharp",
            Language::VisualBasic => "VisualBasic",
            Language::FSharp => "FSharp",
            Language::Python => "Python",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Error,
    Warning,
    Info,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::Error => "error",
            ErrorType::Warning => "warning",
            ErrorType::Info => "info",
        };
        f.write_str(name)
    }
}

/// 1-based position of a diagnostic inside one source file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: &str, line: u32, column: u32) -> Self {
        Location {
            file: file.to_string(),
            line,
            column,
        }
    }
}

/// One diagnostic produced by a compile or analysis pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationError {
    pub id: String,
    pub error_type: ErrorType,
    pub message: String,
    pub location: Option<Location>,
}

impl CompilationError {
    pub fn new(id: &str, error_type: ErrorType, message: impl Into<String>) -> Self {
        CompilationError {
            id: id.to_string(),
            error_type,
            message: message.into(),
            location: None,
        }
    }

    pub fn error(id: &str, message: impl Into<String>) -> Self {
        Self::new(id, ErrorType::Error, message)
    }

    pub fn warning(id: &str, message: impl Into<String>) -> Self {
        Self::new(id, ErrorType::Warning, message)
    }

    pub fn info(id: &str, message: impl Into<String>) -> Self {
        Self::new(id, ErrorType::Info, message)
    }

    pub fn at(self, location: Location) -> Self {
        Self {
            location: Some(location),
            ..self
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_type == ErrorType::Error
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{}({},{}): ", loc.file, loc.line, loc.column)?;
        }
        write!(f, "{} {}: {}", self.error_type, self.id, self.message)
    }
}

/// Outcome of one compile call. Owned by the caller that receives it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompilationResult {
    pub errors: Vec<CompilationError>,
    pub image: Option<Vec<u8>>,
}

impl CompilationResult {
    pub fn new(errors: Vec<CompilationError>, image: Option<Vec<u8>>) -> Self {
        CompilationResult { errors, image }
    }

    pub fn failed(errors: Vec<CompilationError>) -> Self {
        CompilationResult {
            errors,
            image: None,
        }
    }

    /// The compiled image, or `None` when the compile reported errors.
    pub fn assembly(&self) -> Option<&[u8]> {
        if self.errors.iter().any(CompilationError::is_error) {
            return None;
        }
        self.image.as_deref()
    }

    pub fn summary(&self) -> String {
        self.errors.iter().map(ToString::to_string).join("\n")
    }
}

/// A reference image handed to a compiler backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub body: Vec<u8>,
}

impl Reference {
    pub fn new(name: impl Into<String>, body: Vec<u8>) -> Self {
        Reference {
            name: name.into(),
            body,
        }
    }
}

impl From<(String, Vec<u8>)> for Reference {
    fn from((name, body): (String, Vec<u8>)) -> Self {
        Reference { name, body }
    }
}

/// Contents of an analyzer's additional input, such as a banned-symbols list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerSettings {
    pub path: String,
    pub text: String,
}

impl AnalyzerSettings {
    pub fn new(path: &str, text: &str) -> Self {
        AnalyzerSettings {
            path: path.to_string(),
            text: text.to_string(),
        }
    }

    /// File name part of `path`, whichever separator it uses.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Namespace,
    Type,
    Method,
    Property,
    Field,
    Event,
}

impl SymbolKind {
    /// Prefix used by documentation-comment ids, e.g. `T:` for types.
    pub fn doc_prefix(&self) -> char {
        match self {
            SymbolKind::Namespace => 'N',
            SymbolKind::Type => 'T',
            SymbolKind::Method => 'M',
            SymbolKind::Property => 'P',
            SymbolKind::Field => 'F',
            SymbolKind::Event => 'E',
        }
    }
}

/// A use-site of a resolved symbol in the analysed sources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolUse {
    pub kind: SymbolKind,
    /// Documentation-comment id, e.g. `T:System.Diagnostics.Process`.
    pub doc_id: String,
    /// Simple name as written at the use-site.
    pub name: String,
    /// Namespace of the symbol (for members, of the containing type).
    pub namespace: String,
    /// Doc id of the containing type for members.
    pub container: Option<String>,
    pub location: Location,
}

/// Language-neutral view of the bound sources that analyzers consume.
#[derive(Clone, Debug, Default)]
pub struct SemanticModel {
    pub unit_name: String,
    pub symbol_uses: Vec<SymbolUse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let err = CompilationError::error("CS1513", "} expected").at(Location::new("test.cs", 1, 15));
        assert_eq!(err.to_string(), "test.cs(1,15): error CS1513: } expected");
    }

    #[test]
    fn test_display_without_location() {
        let err = CompilationError::warning("CS0105", "duplicate");
        assert_eq!(err.to_string(), "warning CS0105: duplicate");
    }

    #[test]
    fn test_assembly_hidden_when_errors() {
        let res = CompilationResult::new(
            vec![CompilationError::error("X", "boom")],
            Some(vec![1, 2, 3]),
        );
        assert!(res.assembly().is_none());

        let res = CompilationResult::new(
            vec![CompilationError::info("Y", "fine")],
            Some(vec![1, 2, 3]),
        );
        assert_eq!(res.assembly(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_settings_file_name() {
        let settings = AnalyzerSettings::new("C:\\proj\\BannedSymbols.txt", "");
        assert_eq!(settings.file_name(), "BannedSymbols.txt");
        let settings = AnalyzerSettings::new("BannedSymbols.txt", "");
        assert_eq!(settings.file_name(), "BannedSymbols.txt");
    }
}
