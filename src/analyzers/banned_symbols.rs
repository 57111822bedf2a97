use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::constants::BANNED_SYMBOLS_FILE;
use crate::core::{
    domain::{AnalyzerSettings, CompilationError, SemanticModel, SymbolKind, SymbolUse},
    traits::Analyzer,
};

pub const BANNED_SYMBOL_ID: &str = "RS0030";

static RULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>[TMPFEN]):(?P<symbol>[^;]+?)\s*(?:;(?P<message>.*))?$")
        .expect("banned symbol rule regex is valid")
});

/// One `<doc-id>;<message>` line of a banned-symbols file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BannedSymbol {
    pub kind: SymbolKind,
    /// Doc id with any parameter list removed, e.g. `M:System.Console.WriteLine`.
    pub doc_id: String,
    pub message: String,
}

impl BannedSymbol {
    pub fn parse(line: &str) -> Option<Self> {
        let captures = RULE_REGEX.captures(line.trim())?;
        let kind = match &captures["kind"] {
            "T" => SymbolKind::Type,
            "M" => SymbolKind::Method,
            "P" => SymbolKind::Property,
            "F" => SymbolKind::Field,
            "E" => SymbolKind::Event,
            _ => SymbolKind::Namespace,
        };
        // Overloads are not distinguished.
        let symbol = captures["symbol"]
            .split('(')
            .next()
            .unwrap_or_default()
            .trim();
        if symbol.is_empty() {
            return None;
        }
        Some(BannedSymbol {
            kind,
            doc_id: format!("{}:{}", kind.doc_prefix(), symbol),
            message: captures
                .name("message")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        })
    }

    fn symbol(&self) -> &str {
        &self.doc_id[2..]
    }

    pub fn matches(&self, symbol_use: &SymbolUse) -> bool {
        match self.kind {
            SymbolKind::Namespace => {
                let namespace = self.symbol();
                symbol_use.kind == SymbolKind::Type
                    && (symbol_use.namespace == namespace
                        || symbol_use
                            .namespace
                            .strip_prefix(namespace)
                            .is_some_and(|rest| rest.starts_with('.')))
            }
            kind => symbol_use.kind == kind && symbol_use.doc_id == self.doc_id,
        }
    }
}

/// Parses every rule in `text`, skipping blank lines and `//` comments.
pub fn parse_banned_symbols(text: &str) -> Vec<BannedSymbol> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .filter_map(|line| {
            let rule = BannedSymbol::parse(line);
            if rule.is_none() {
                tracing::warn!("Ignoring malformed banned symbol rule: {}", line);
            }
            rule
        })
        .collect()
}

/// Flags every use-site of a symbol listed in `BannedSymbols.txt` (or
/// `BannedSymbols.*.txt`) settings.
#[derive(Clone, Debug, Default)]
pub struct BannedSymbolsAnalyzer;

impl BannedSymbolsAnalyzer {
    pub fn is_settings_file(settings: &AnalyzerSettings) -> bool {
        let name = settings.file_name();
        name.eq_ignore_ascii_case(BANNED_SYMBOLS_FILE)
            || (name.starts_with("BannedSymbols.") && name.ends_with(".txt"))
    }

    pub fn rules(settings: &[AnalyzerSettings]) -> Vec<BannedSymbol> {
        settings
            .iter()
            .filter(|s| Self::is_settings_file(s))
            .flat_map(|s| parse_banned_symbols(&s.text))
            .collect()
    }
}

fn banned_message(symbol_use: &SymbolUse, rule: &BannedSymbol) -> String {
    if rule.message.is_empty() {
        format!("The symbol '{}' is banned in this project", symbol_use.name)
    } else {
        format!(
            "The symbol '{}' is banned in this project: {}",
            symbol_use.name, rule.message
        )
    }
}

impl Analyzer for BannedSymbolsAnalyzer {
    fn id(&self) -> &str {
        BANNED_SYMBOL_ID
    }

    fn analyse(&self, model: &SemanticModel, settings: &[AnalyzerSettings]) -> Vec<CompilationError> {
        let rules = Self::rules(settings);
        if rules.is_empty() {
            return Vec::new();
        }
        tracing::debug!(
            "Checking {} symbol uses of {} against {} banned symbols",
            model.symbol_uses.len(),
            model.unit_name,
            rules.len()
        );

        model
            .symbol_uses
            .iter()
            .filter_map(|symbol_use| {
                let rule = rules.iter().find(|r| r.matches(symbol_use))?;
                Some(
                    CompilationError::error(BANNED_SYMBOL_ID, banned_message(symbol_use, rule))
                        .at(symbol_use.location.clone()),
                )
            })
            .collect()
    }
}

/// Builds the analyzer together with the settings file carrying `rules`.
pub fn to_banned_symbols_analyzer(rules: &str) -> (Arc<dyn Analyzer>, AnalyzerSettings) {
    (
        Arc::new(BannedSymbolsAnalyzer),
        AnalyzerSettings::new(BANNED_SYMBOLS_FILE, rules),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Location;

    fn type_use(doc_id: &str, name: &str, namespace: &str) -> SymbolUse {
        SymbolUse {
            kind: SymbolKind::Type,
            doc_id: doc_id.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            container: None,
            location: Location::new("test.cs", 1, 1),
        }
    }

    fn method_use(doc_id: &str, name: &str) -> SymbolUse {
        SymbolUse {
            kind: SymbolKind::Method,
            doc_id: doc_id.to_string(),
            name: name.to_string(),
            namespace: "System".to_string(),
            container: Some("T:System.Console".to_string()),
            location: Location::new("test.cs", 2, 5),
        }
    }

    #[test]
    fn test_parse_rules() {
        let rules = parse_banned_symbols(
            "// comment\n\nT:System.Diagnostics.Process;Don't use Process\nM:System.Console.WriteLine(System.String)\nnonsense\nN:System.IO ; no files ",
        );
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].doc_id, "T:System.Diagnostics.Process");
        assert_eq!(rules[0].message, "Don't use Process");
        assert_eq!(rules[1].doc_id, "M:System.Console.WriteLine");
        assert_eq!(rules[1].message, "");
        assert_eq!(rules[2].kind, SymbolKind::Namespace);
        assert_eq!(rules[2].message, "no files");
    }

    #[test]
    fn test_type_rule() {
        let (analyzer, settings) = to_banned_symbols_analyzer("T:System.Diagnostics.Process;Don't use Process");
        let model = SemanticModel {
            unit_name: "test".to_string(),
            symbol_uses: vec![
                type_use("T:System.Diagnostics.Process", "Process", "System.Diagnostics"),
                type_use("T:System.Object", "object", "System"),
            ],
        };

        let diagnostics = analyzer.analyse(&model, &[settings]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "The symbol 'Process' is banned in this project: Don't use Process"
        );
        assert_eq!(diagnostics[0].id, BANNED_SYMBOL_ID);
        assert!(diagnostics[0].is_error());
    }

    #[test]
    fn test_method_rule_ignores_overloads() {
        let (analyzer, settings) = to_banned_symbols_analyzer("M:System.Console.WriteLine(System.String)");
        let model = SemanticModel {
            unit_name: "test".to_string(),
            symbol_uses: vec![method_use("M:System.Console.WriteLine", "Console.WriteLine")],
        };

        let diagnostics = analyzer.analyse(&model, &[settings]);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "The symbol 'Console.WriteLine' is banned in this project"
        );
        assert_eq!(diagnostics[0].location, Some(Location::new("test.cs", 2, 5)));
    }

    #[test]
    fn test_namespace_rule() {
        let rule = BannedSymbol::parse("N:System.IO;no").unwrap();
        assert!(rule.matches(&type_use("T:System.IO.File", "File", "System.IO")));
        assert!(rule.matches(&type_use("T:System.IO.Pipes.Pipe", "Pipe", "System.IO.Pipes")));
        assert!(!rule.matches(&type_use("T:System.IOStream", "IOStream", "System")));
        assert!(!rule.matches(&type_use("T:System.IOX.A", "A", "System.IOX")));
    }

    #[test]
    fn test_settings_file_names() {
        assert!(BannedSymbolsAnalyzer::is_settings_file(&AnalyzerSettings::new("a/BannedSymbols.txt", "")));
        assert!(BannedSymbolsAnalyzer::is_settings_file(&AnalyzerSettings::new("c:\\x\\BannedSymbols.Net.txt", "")));
        assert!(!BannedSymbolsAnalyzer::is_settings_file(&AnalyzerSettings::new("rules.txt", "")));

        let model = SemanticModel {
            unit_name: "test".to_string(),
            symbol_uses: vec![type_use("T:System.Object", "object", "System")],
        };
        let ignored = AnalyzerSettings::new("other.txt", "T:System.Object");
        assert!(BannedSymbolsAnalyzer.analyse(&model, &[ignored]).is_empty());
    }
}
