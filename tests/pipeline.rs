use std::fs;
use std::path::PathBuf;

use msci_compiler::command::BranchLogic;
use msci_compiler::syntax::ParameterType;
use msci_compiler::{parse_text, read_serialized, CompilerError, GameVersion, SyntaxLibrary};
use pretty_assertions::assert_eq;

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("data").join(name)
}

fn library() -> SyntaxLibrary {
    let mut library = SyntaxLibrary::new();
    let base = library.merge_file(&data("base.txt")).unwrap();
    assert_eq!((base.added, base.skipped), (5, 0));
    let extra = library.merge_file(&data("extra.json")).unwrap();
    assert_eq!((extra.added, extra.skipped), (1, 0));
    library
}

fn source() -> String {
    fs::read_to_string(data("patrol.txt")).unwrap()
}

#[test]
fn test_load_merges_files_in_order() {
    let library = SyntaxLibrary::load(&[data("base.txt"), data("extra.json")]).unwrap();
    // nop and comment are always present
    assert_eq!(library.len(), 8);
    assert!(library.find(108, GameVersion::ALBION_PRELUDE).is_ok());
    assert!(library.find(108, GameVersion::REUNION).is_err());

    assert!(matches!(
        SyntaxLibrary::load(&[data("missing.txt")]),
        Err(CompilerError::FileNotFound(_))
    ));
}

#[test]
fn test_source_parses_and_renders_unchanged() {
    let source = source();
    let lines: Vec<&str> = source.lines().collect();
    let script = parse_text(&lines, &library(), GameVersion::TERRAN_CONFLICT);

    assert!(script.errors.is_empty(), "{:?}", script.errors);
    assert!(script.verify().is_empty());
    assert_eq!(script.to_text(), source);

    let names: Vec<&str> = script.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["count", "name", "ship"]);

    let logic: Vec<BranchLogic> = script.root.nodes().map(|node| node.logic).collect();
    assert_eq!(
        logic,
        vec![
            BranchLogic::Nop,
            BranchLogic::None,
            BranchLogic::While,
            BranchLogic::None,
            BranchLogic::If,
            BranchLogic::None,
            BranchLogic::Else,
            BranchLogic::None,
            BranchLogic::End,
            BranchLogic::End,
            BranchLogic::None,
        ]
    );
}

#[test]
fn test_commands_missing_from_a_release_are_flagged() {
    let source = source();
    let lines: Vec<&str> = source.lines().collect();
    let script = parse_text(&lines, &library(), GameVersion::REUNION);

    let invalid: Vec<usize> = script.verify().iter().map(|node| node.line_number).collect();
    assert_eq!(invalid, vec![11]);
    assert_eq!(script.errors.len(), 1);
    assert_eq!(script.errors[0].line, 11);
    // the rest of the script is still usable
    assert_eq!(script.to_text(), source);
}

#[test]
fn test_compiled_script_decompiles_to_source() {
    let file = read_serialized(fs::File::open(data("patrol.xml")).unwrap(), &library()).unwrap();

    assert_eq!(file.name, "plugin.patrol");
    assert_eq!(file.description, "patrols the sector");
    assert_eq!(file.target_version(), Some(GameVersion::TERRAN_CONFLICT));
    assert_eq!(file.arguments.len(), 1);
    assert_eq!(file.arguments[0].name, "count");
    assert_eq!(file.arguments[0].param_type, ParameterType::VarNumber);
    assert_eq!(file.commands[0].ref_index, Some(0));

    assert_eq!(file.to_text(), source());
}

#[test]
fn test_both_paths_agree_on_command_ids() {
    let library = library();
    let source = source();
    let lines: Vec<&str> = source.lines().collect();
    let parsed = parse_text(&lines, &library, GameVersion::TERRAN_CONFLICT);
    let compiled = read_serialized(fs::File::open(data("patrol.xml")).unwrap(), &library).unwrap();

    let parsed_ids: Vec<u32> = parsed.commands().map(|c| c.id()).collect();
    let compiled_ids: Vec<u32> = compiled.commands.iter().map(|c| c.id()).collect();
    assert_eq!(parsed_ids, compiled_ids);
}
