use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::source;
use super::{CommandKind, CommandSyntax};
use crate::error::{CompilerError, SignatureNotFound};
use crate::hasher::{hash, TrieKey};
use crate::token::{Token, TokenKind};
use crate::version::GameVersion;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<TrieKey, usize>,
    /// Signatures whose wording ends at this node.
    signatures: Vec<usize>,
}

/// Outcome of one `merge`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub skipped: usize,
}

/// A signature matched against a source line.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub syntax: Arc<CommandSyntax>,
    /// Tokens that took an "any" edge, in order.
    pub slots: Vec<Token>,
    /// Tokens past the end of a script call's wording.
    pub trailing: Vec<Token>,
}

/// Every command signature known for a set of game data.
///
/// Built by sequential `merge` calls, then shared read-only. Switching game data
/// means building a new library, never mutating one that parsers hold.
#[derive(Debug)]
pub struct SyntaxLibrary {
    signatures: Vec<Arc<CommandSyntax>>,
    by_id: HashMap<u32, Vec<usize>>,
    trie: Vec<TrieNode>,
}

impl Default for SyntaxLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntaxLibrary {
    /// An empty library holding only the built-in NOP and comment signatures.
    pub fn new() -> Self {
        let mut library = Self {
            signatures: Vec::new(),
            by_id: HashMap::new(),
            trie: vec![TrieNode::default()],
        };
        library.push(CommandSyntax::nop(), &[]);
        library.push(CommandSyntax::comment(), &[]);
        library
    }

    /// Build a library from syntax files, merged in order.
    pub fn load(paths: &[PathBuf]) -> Result<Arc<SyntaxLibrary>, CompilerError> {
        let mut library = Self::new();
        for path in paths {
            let report = library.merge_file(path)?;
            info!(
                path = %path.display(),
                added = report.added,
                skipped = report.skipped,
                "merged syntax file"
            );
        }
        Ok(Arc::new(library))
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommandSyntax>> {
        self.signatures.iter()
    }

    /// Merge a syntax file, choosing the format from its extension: `.json`,
    /// anything else is legacy text.
    pub fn merge_file(&mut self, path: &Path) -> Result<MergeReport, CompilerError> {
        if !path.exists() {
            return Err(CompilerError::FileNotFound(format!(
                "Syntax file not found: {}",
                path.display()
            )));
        }
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => self.merge_json(&text),
            _ => Ok(self.merge_legacy(&text)),
        }
    }

    pub fn merge_legacy(&mut self, text: &str) -> MergeReport {
        let records = source::parse_legacy(text);
        let mut report = self.merge(records.syntaxes);
        report.skipped += records.rejected;
        report
    }

    pub fn merge_json(&mut self, text: &str) -> Result<MergeReport, CompilerError> {
        let syntaxes = source::parse_json(text)
            .map_err(|e| {
                CompilerError::SyntaxSource(format!("invalid JSON syntax source: {}", e))
            })?;
        Ok(self.merge(syntaxes))
    }

    /// Add signatures without replacing any already known for the same id and release.
    pub fn merge(&mut self, syntaxes: impl IntoIterator<Item = CommandSyntax>) -> MergeReport {
        let mut report = MergeReport::default();
        for syntax in syntaxes {
            if self.add(syntax) {
                report.added += 1;
            } else {
                report.skipped += 1;
            }
        }
        report
    }

    fn add(&mut self, mut syntax: CommandSyntax) -> bool {
        let covered = self
            .by_id
            .get(&syntax.id)
            .into_iter()
            .flatten()
            .fold(GameVersion::NONE, |acc, &i| acc | self.signatures[i].versions);

        if syntax.versions.intersects(covered) {
            let remaining = syntax.versions.without(covered);
            warn!(
                id = syntax.id,
                overlap = %(syntax.versions & covered),
                "syntax already defined for these versions"
            );
            if remaining.is_empty() {
                return false;
            }
            syntax.versions = remaining;
        }

        let path = syntax.trie_path();
        let needs_wording = matches!(syntax.kind, CommandKind::Standard | CommandKind::ScriptCall);
        if path.is_empty() && needs_wording {
            warn!(
                id = syntax.id,
                template = %syntax.text_template,
                "syntax template has no matchable tokens, skipping"
            );
            return false;
        }

        self.push(syntax, &path);
        true
    }

    fn push(&mut self, syntax: CommandSyntax, path: &[TrieKey]) {
        let index = self.signatures.len();
        self.by_id.entry(syntax.id).or_default().push(index);
        self.signatures.push(Arc::new(syntax));

        if path.is_empty() {
            return;
        }
        let mut node = 0;
        for key in path {
            node = match self.trie[node].children.get(key) {
                Some(&child) => child,
                None => {
                    let child = self.trie.len();
                    self.trie.push(TrieNode::default());
                    self.trie[node].children.insert(key.clone(), child);
                    child
                }
            };
        }
        self.trie[node].signatures.push(index);
    }

    /// The signature of command `id` valid for `version`.
    pub fn find(
        &self,
        id: u32,
        version: GameVersion,
    ) -> Result<Arc<CommandSyntax>, SignatureNotFound> {
        self.by_id
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&i| &self.signatures[i])
            .find(|s| s.versions.contains(version))
            .cloned()
            .ok_or(SignatureNotFound::ById { id, version })
    }

    /// Identify the command `tokens` spell, or the unknown sentinel.
    pub fn identify(&self, tokens: &[Token], version: GameVersion) -> Arc<CommandSyntax> {
        match self.resolve(tokens, version) {
            Ok(resolved) => resolved.syntax,
            Err(_) => Arc::new(CommandSyntax::unknown()),
        }
    }

    /// Walk the trie with `tokens`, preferring exact wording over the "any" edge.
    pub fn resolve(
        &self,
        tokens: &[Token],
        version: GameVersion,
    ) -> Result<Resolved, SignatureNotFound> {
        let tokens: Vec<&Token> = tokens.iter().filter(|t| TrieKey::of(t).is_some()).collect();
        let mut bound = Vec::new();

        match self.walk(0, &tokens, 0, version, &mut bound) {
            Some((index, consumed)) => {
                let syntax = self.signatures[index].clone();
                debug!(id = syntax.id, template = %syntax.text_template, "identified command");
                Ok(Resolved {
                    syntax,
                    slots: bound.iter().map(|&i| tokens[i].clone()).collect(),
                    trailing: tokens[consumed..].iter().map(|t| (*t).clone()).collect(),
                })
            }
            None => {
                let owned: Vec<Token> = tokens.iter().map(|t| (*t).clone()).collect();
                Err(SignatureNotFound::ByText {
                    key: hash(&owned).key,
                    version,
                })
            }
        }
    }

    fn walk(
        &self,
        node: usize,
        tokens: &[&Token],
        pos: usize,
        version: GameVersion,
        bound: &mut Vec<usize>,
    ) -> Option<(usize, usize)> {
        let here = &self.trie[node];

        let Some(token) = tokens.get(pos) else {
            return here
                .signatures
                .iter()
                .copied()
                .find(|&i| self.signatures[i].versions.contains(version))
                .map(|i| (i, pos));
        };

        let mut edges = Vec::with_capacity(2);
        if token.is_literal() || token.is_slot() {
            edges.push((TrieKey::Word(token.text.to_lowercase()), false));
        }
        if token.is_slot() || token.kind == TokenKind::Text {
            edges.push((TrieKey::Any, true));
        }

        for (key, binds) in edges {
            let Some(&child) = here.children.get(&key) else {
                continue;
            };
            if binds {
                bound.push(pos);
            }
            if let Some(found) = self.walk(child, tokens, pos + 1, version, bound) {
                return Some(found);
            }
            if binds {
                bound.pop();
            }
        }

        // a script call takes its arguments after the wording ends
        here.signatures
            .iter()
            .copied()
            .find(|&i| {
                let syntax = &self.signatures[i];
                syntax.kind == CommandKind::ScriptCall && syntax.versions.contains(version)
            })
            .map(|i| (i, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::syntax::{ParameterSyntax, ParameterType, CMD_COMMENT};
    use pretty_assertions::assert_eq;

    fn syntax(
        id: u32,
        versions: GameVersion,
        template: &str,
        params: &[ParameterType],
    ) -> CommandSyntax {
        CommandSyntax {
            id,
            kind: CommandKind::Standard,
            text_template: template.to_string(),
            parameters: params
                .iter()
                .enumerate()
                .map(|(i, t)| ParameterSyntax::new(*t, i as u8, i as u8))
                .collect(),
            versions,
        }
    }

    fn library() -> SyntaxLibrary {
        let mut library = SyntaxLibrary::new();
        library.merge(vec![
            syntax(
                200,
                GameVersion::ALL,
                "$0 $1 -> get name",
                &[ParameterType::ReturnValue, ParameterType::RefObj],
            ),
            syntax(
                201,
                GameVersion::TERRAN_CONFLICT | GameVersion::ALBION_PRELUDE,
                "$0 $1 -> get owner race",
                &[ParameterType::ReturnValue, ParameterType::RefObj],
            ),
            syntax(210, GameVersion::ALL, "goto label $0", &[ParameterType::Label]),
            syntax(211, GameVersion::ALL, "goto label end of script", &[]),
        ]);
        library
    }

    #[test]
    fn test_find_respects_versions() {
        let library = library();
        let found = library.find(201, GameVersion::ALBION_PRELUDE).unwrap();
        assert!(found.versions.contains(GameVersion::ALBION_PRELUDE));
        assert_eq!(
            library.find(201, GameVersion::REUNION),
            Err(SignatureNotFound::ById {
                id: 201,
                version: GameVersion::REUNION
            })
        );
        assert_eq!(library.find(CMD_COMMENT, GameVersion::THREAT).unwrap().id, CMD_COMMENT);
    }

    #[test]
    fn test_identify_ignores_slot_values() {
        let library = library();
        let a = library.identify(&tokenize("[THIS] -> get name"), GameVersion::REUNION);
        let b = library.identify(&tokenize("$ship -> GET NAME"), GameVersion::REUNION);
        assert_eq!(a.id, 200);
        assert_eq!(b.id, 200);

        let unknown = library.identify(&tokenize("$ship -> explode loudly"), GameVersion::REUNION);
        assert!(unknown.is_unknown());
    }

    #[test]
    fn test_identify_checks_version() {
        let library = library();
        let tokens = tokenize("$ship -> get owner race");
        assert_eq!(library.identify(&tokens, GameVersion::TERRAN_CONFLICT).id, 201);
        assert!(library.identify(&tokens, GameVersion::THREAT).is_unknown());
    }

    #[test]
    fn test_exact_wording_beats_any_edge() {
        let library = library();
        let exact = library
            .resolve(&tokenize("goto label end of script"), GameVersion::ALL)
            .unwrap();
        assert_eq!(exact.syntax.id, 211);

        let label = library.resolve(&tokenize("goto label Start"), GameVersion::REBIRTH).unwrap();
        assert_eq!(label.syntax.id, 210);
        assert_eq!(label.slots.len(), 1);
        assert_eq!(label.slots[0].text, "Start");

        // keywords never bind to a slot, so "end" cannot be a label name
        let backtracked = library.resolve(&tokenize("goto label end"), GameVersion::ALL);
        assert!(backtracked.is_err());
    }

    #[test]
    fn test_values_in_the_wording_match_exactly() {
        let mut library = library();
        library.merge(vec![syntax(
            220,
            GameVersion::ALL,
            "add 3 to $0",
            &[ParameterType::Variable],
        )]);

        let resolved = library.resolve(&tokenize("add 3 to $x"), GameVersion::ALL).unwrap();
        assert_eq!(resolved.syntax.id, 220);
        let slots: Vec<&str> = resolved.slots.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(slots, vec!["$x"]);

        assert!(library.resolve(&tokenize("add 7 to $x"), GameVersion::ALL).is_err());
    }

    #[test]
    fn test_merge_never_overwrites() {
        let mut library = library();
        let before = library.len();
        let report = library.merge(vec![
            syntax(200, GameVersion::ALL, "$0 $1 -> something else", &[ParameterType::ReturnValue]),
            syntax(
                201,
                GameVersion::ALL,
                "$0 $1 -> get owner race",
                &[ParameterType::ReturnValue, ParameterType::RefObj],
            ),
        ]);
        assert_eq!(report, MergeReport { added: 1, skipped: 1 });
        assert_eq!(library.len(), before + 1);
        assert_eq!(
            library.find(200, GameVersion::REUNION).unwrap().text_template,
            "$0 $1 -> get name"
        );

        // the second entry only gained the releases that were not yet covered
        let widened = library.find(201, GameVersion::REUNION).unwrap();
        assert_eq!(
            widened.versions,
            GameVersion::THREAT | GameVersion::REUNION | GameVersion::REBIRTH
        );
    }

    #[test]
    fn test_empty_templates_are_skipped() {
        let mut library = SyntaxLibrary::new();
        let report = library.merge(vec![syntax(300, GameVersion::ALL, "  ", &[])]);
        assert_eq!(report, MergeReport { added: 0, skipped: 1 });
        assert!(library.find(300, GameVersion::ALL).is_err());
    }

    #[test]
    fn test_library_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyntaxLibrary>();
    }
}
