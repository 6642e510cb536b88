//! Text pipeline definitions.
//!
//! Pipeline format:
//! ```text
//! # keep the errors of one log
//! PIPE FILE "logs/app.log"
//! | KEEP ".*ERROR.*"
//! | UPPER
//! | STDOUT
//! ?
//! ```
//!
//! - `PIPE <command>` starts the pipeline
//! - `| <command>` adds the next element
//! - `?` on its own line marks the end of the pipeline
//! - Lines starting with `#` are comments
//!
//! String arguments are delimited: the first non-blank character is the
//! delimiter and the string runs to its next occurrence, so `"a b"`,
//! `/a b/` and `'a b'` are the same argument.
//!
//! Every command has a role and is routed into the pipeline by it. The
//! first command must be a source; after that sources, stages and sinks
//! may appear in any order and keep their relative order.
//!
//! Sources:
//! - `FILE "path"` - Lines of one file, read by the registered handler
//! - `FOLDER "path" [KEEP "glob"]... [IGNORE "glob"]...` - Files directly inside a folder
//! - `GLOB "path" [PRUNE "name"]... [KEEP "glob"]... [IGNORE "glob"]...` - Files of a tree
//! - `STRING "text" [SEP "separator"]` - Chunks of an inline string
//!
//! Stages:
//! - `PASS` - Pass records through unchanged
//! - `UPPER` / `LOWER` - Change case
//! - `META` - Prefix records with `resource:sequence:`
//! - `KEEP "regex"` / `SKIP "regex"` - Keep or drop records matching at the start
//! - `CHANGE "regex" "replacement"` - Replace every match
//! - `SQUEEZE` - Collapse runs of blank records
//!
//! Sinks:
//! - `STDOUT` - Print each record
//! - `TOFILE "path" [APPEND]` - Write each record as a line of a file
//! - `JSON "path" [DESC "description"]` - Write one JSON document

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::{Element, Pipeline, Role};
use crate::sink::{FileSink, JsonSink, StdoutSink};
use crate::source::{FileSource, FolderSource, GlobSource, HandlerRegistry, StringSource};
use crate::stage::{
    AddMetadata, LowerCase, PassThrough, RegexKeep, RegexSkip, RegexSubstitute,
    SkipRepeatedBlankLines, UpperCase,
};

/// Parsed pipeline command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// FILE "path"
    File { path: String },
    /// FOLDER "path" KEEP "glob" IGNORE "glob"
    Folder {
        path: String,
        keep: Vec<String>,
        ignore: Vec<String>,
    },
    /// GLOB "path" PRUNE "name" KEEP "glob" IGNORE "glob"
    Glob {
        path: String,
        prune: Vec<String>,
        keep: Vec<String>,
        ignore: Vec<String>,
    },
    /// STRING "text" SEP "separator"
    Text {
        text: String,
        separator: Option<String>,
    },
    /// PASS
    Pass,
    /// UPPER
    Upper,
    /// LOWER
    Lower,
    /// META
    Meta,
    /// KEEP "regex"
    Keep { pattern: String },
    /// SKIP "regex"
    Skip { pattern: String },
    /// CHANGE "regex" "replacement"
    Change {
        pattern: String,
        replacement: String,
    },
    /// SQUEEZE
    Squeeze,
    /// STDOUT
    Stdout,
    /// TOFILE "path" APPEND
    ToFile { path: String, append: bool },
    /// JSON "path" DESC "description"
    Json {
        path: String,
        description: Option<String>,
    },
}

impl Command {
    /// The pipeline list this command lands in.
    pub fn role(&self) -> Role {
        match self {
            Command::File { .. }
            | Command::Folder { .. }
            | Command::Glob { .. }
            | Command::Text { .. } => Role::Source,
            Command::Stdout | Command::ToFile { .. } | Command::Json { .. } => Role::Sink,
            _ => Role::Stage,
        }
    }

    /// Get the command name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::File { .. } => "FILE",
            Command::Folder { .. } => "FOLDER",
            Command::Glob { .. } => "GLOB",
            Command::Text { .. } => "STRING",
            Command::Pass => "PASS",
            Command::Upper => "UPPER",
            Command::Lower => "LOWER",
            Command::Meta => "META",
            Command::Keep { .. } => "KEEP",
            Command::Skip { .. } => "SKIP",
            Command::Change { .. } => "CHANGE",
            Command::Squeeze => "SQUEEZE",
            Command::Stdout => "STDOUT",
            Command::ToFile { .. } => "TOFILE",
            Command::Json { .. } => "JSON",
        }
    }

    /// Build the pipeline element; file sources resolve handlers through
    /// `registry`.
    pub fn to_element(&self, registry: &HandlerRegistry) -> Result<Element> {
        let element: Element = match self {
            Command::File { path } => FileSource::with_registry(path, registry).into(),
            Command::Folder { path, keep, ignore } => {
                FolderSource::with_patterns(path, keep, ignore)?
                    .registry(registry)
                    .into()
            }
            Command::Glob {
                path,
                prune,
                keep,
                ignore,
            } => {
                let mut source = GlobSource::new(path)?.prune(prune).registry(registry);
                if !keep.is_empty() {
                    source = source.keep(keep)?;
                }
                if !ignore.is_empty() {
                    source = source.ignore(ignore)?;
                }
                source.into()
            }
            Command::Text { text, separator } => {
                let source = StringSource::new(text.as_str());
                match separator {
                    Some(sep) => source.with_separator(sep)?.into(),
                    None => source.into(),
                }
            }
            Command::Pass => PassThrough.into(),
            Command::Upper => UpperCase.into(),
            Command::Lower => LowerCase.into(),
            Command::Meta => AddMetadata.into(),
            Command::Keep { pattern } => RegexKeep::new(pattern)?.into(),
            Command::Skip { pattern } => RegexSkip::new(pattern)?.into(),
            Command::Change {
                pattern,
                replacement,
            } => RegexSubstitute::new(pattern, replacement)?.into(),
            Command::Squeeze => SkipRepeatedBlankLines::new().into(),
            Command::Stdout => StdoutSink.into(),
            Command::ToFile { path, append } => {
                let sink = FileSink::new(path);
                let sink = if *append { sink.append() } else { sink };
                sink.into()
            }
            Command::Json { path, description } => {
                let sink = JsonSink::new(path);
                match description {
                    Some(desc) => sink.description(desc).into(),
                    None => sink.into(),
                }
            }
        };
        Ok(element)
    }
}

/// Parse DSL text into commands.
pub fn parse_commands(text: &str) -> Result<Vec<Command>> {
    let mut commands = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = if line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("PIPE ")) {
            line[5..].trim()
        } else if line.eq_ignore_ascii_case("PIPE") {
            continue;
        } else {
            line
        };

        let line = match line.strip_prefix('|') {
            Some(stripped) => stripped.trim(),
            None => line,
        };

        // Remove trailing ? (explicit end of pipeline)
        let line = line.trim_end_matches('?').trim();

        if line.is_empty() {
            continue;
        }

        commands.push(parse_command(line, line_num + 1)?);
    }

    Ok(commands)
}

/// Parse a single command line.
fn parse_command(line: &str, line_num: usize) -> Result<Command> {
    let (word, rest) = split_word(line);
    let parsed = match word.to_uppercase().as_str() {
        "FILE" => parse_file(rest),
        "FOLDER" => parse_folder(rest),
        "GLOB" => parse_glob(rest),
        "STRING" => parse_string(rest),
        "PASS" => finished(Command::Pass, rest),
        "UPPER" => finished(Command::Upper, rest),
        "LOWER" => finished(Command::Lower, rest),
        "META" => finished(Command::Meta, rest),
        "KEEP" => parse_delimited_string(rest)
            .and_then(|(pattern, rest)| finished(Command::Keep { pattern }, rest)),
        "SKIP" => parse_delimited_string(rest)
            .and_then(|(pattern, rest)| finished(Command::Skip { pattern }, rest)),
        "CHANGE" => parse_change(rest),
        "SQUEEZE" => finished(Command::Squeeze, rest),
        "STDOUT" => finished(Command::Stdout, rest),
        "TOFILE" => parse_tofile(rest),
        "JSON" => parse_json(rest),
        _ => {
            return Err(PipelineError::Unsupported(format!(
                "{word} (line {line_num})"
            )));
        }
    };
    parsed.map_err(|message| PipelineError::Parse {
        line: line_num,
        message,
    })
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

/// Parse a delimited string using CMS Pipelines convention.
/// The first non-blank character is the delimiter, and the string
/// continues until the next occurrence of that delimiter.
/// Returns (extracted_string, rest_of_input).
fn parse_delimited_string(s: &str) -> std::result::Result<(String, &str), String> {
    let s = s.trim_start();
    let Some(delim) = s.chars().next() else {
        return Err("Expected delimited string".to_string());
    };
    let after_delim = &s[delim.len_utf8()..];

    match after_delim.find(delim) {
        Some(end) => Ok((
            after_delim[..end].to_string(),
            &after_delim[end + delim.len_utf8()..],
        )),
        None => Err(format!("Unclosed delimiter '{delim}'")),
    }
}

fn finished(command: Command, rest: &str) -> std::result::Result<Command, String> {
    let rest = rest.trim();
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(format!("Unexpected text after {}: {rest}", command.name()))
    }
}

/// Keyword options following the main arguments, e.g. `KEEP "*.txt"`.
///
/// Keywords in `valued` take one delimited string; keywords in `flags`
/// take none. Option keywords are case-insensitive.
fn parse_options(
    mut rest: &str,
    valued: &[&str],
    flags: &[&str],
) -> std::result::Result<Vec<(String, Option<String>)>, String> {
    let mut options = Vec::new();
    loop {
        let (word, after) = split_word(rest);
        if word.is_empty() {
            return Ok(options);
        }
        let key = word.to_uppercase();
        if valued.contains(&key.as_str()) {
            let (value, after) =
                parse_delimited_string(after).map_err(|e| format!("{key}: {e}"))?;
            options.push((key, Some(value)));
            rest = after;
        } else if flags.contains(&key.as_str()) {
            options.push((key, None));
            rest = after;
        } else {
            return Err(format!("Unknown option: {word}"));
        }
    }
}

/// Values of every occurrence of `key`.
fn values(options: &[(String, Option<String>)], key: &str) -> Vec<String> {
    options
        .iter()
        .filter(|(k, _)| k == key)
        .filter_map(|(_, v)| v.clone())
        .collect()
}

fn parse_file(rest: &str) -> std::result::Result<Command, String> {
    let (path, rest) = parse_delimited_string(rest).map_err(|e| format!("FILE: {e}"))?;
    finished(Command::File { path }, rest)
}

fn parse_folder(rest: &str) -> std::result::Result<Command, String> {
    let (path, rest) = parse_delimited_string(rest).map_err(|e| format!("FOLDER: {e}"))?;
    let options = parse_options(rest, &["KEEP", "IGNORE"], &[])?;
    Ok(Command::Folder {
        path,
        keep: values(&options, "KEEP"),
        ignore: values(&options, "IGNORE"),
    })
}

fn parse_glob(rest: &str) -> std::result::Result<Command, String> {
    let (path, rest) = parse_delimited_string(rest).map_err(|e| format!("GLOB: {e}"))?;
    let options = parse_options(rest, &["PRUNE", "KEEP", "IGNORE"], &[])?;
    Ok(Command::Glob {
        path,
        prune: values(&options, "PRUNE"),
        keep: values(&options, "KEEP"),
        ignore: values(&options, "IGNORE"),
    })
}

fn parse_string(rest: &str) -> std::result::Result<Command, String> {
    let (text, rest) = parse_delimited_string(rest).map_err(|e| format!("STRING: {e}"))?;
    let options = parse_options(rest, &["SEP"], &[])?;
    Ok(Command::Text {
        text,
        separator: values(&options, "SEP").pop(),
    })
}

fn parse_change(rest: &str) -> std::result::Result<Command, String> {
    let (pattern, rest) = parse_delimited_string(rest).map_err(|e| format!("CHANGE: {e}"))?;
    let (replacement, rest) =
        parse_delimited_string(rest).map_err(|e| format!("CHANGE replacement: {e}"))?;
    finished(
        Command::Change {
            pattern,
            replacement,
        },
        rest,
    )
}

fn parse_tofile(rest: &str) -> std::result::Result<Command, String> {
    let (path, rest) = parse_delimited_string(rest).map_err(|e| format!("TOFILE: {e}"))?;
    let options = parse_options(rest, &[], &["APPEND"])?;
    Ok(Command::ToFile {
        path,
        append: !options.is_empty(),
    })
}

fn parse_json(rest: &str) -> std::result::Result<Command, String> {
    let (path, rest) = parse_delimited_string(rest).map_err(|e| format!("JSON: {e}"))?;
    let options = parse_options(rest, &["DESC"], &[])?;
    Ok(Command::Json {
        path,
        description: values(&options, "DESC").pop(),
    })
}

/// Parse DSL text and wire the commands into a pipeline.
///
/// Construction errors (bad regex, conflicting patterns, missing glob
/// root) surface here, before anything runs.
pub fn build_pipeline(text: &str, registry: &HandlerRegistry) -> Result<Pipeline> {
    let commands = parse_commands(text)?;
    match commands.first() {
        None => {
            return Err(PipelineError::Parse {
                line: 0,
                message: "Pipeline has no commands".to_string(),
            });
        }
        Some(first) if first.role() != Role::Source => {
            return Err(PipelineError::Parse {
                line: 0,
                message: format!("{} cannot be the first stage; start with a source", first.name()),
            });
        }
        Some(_) => {}
    }

    let mut pipeline = Pipeline::new();
    for command in &commands {
        debug!(command = command.name(), role = %command.role(), "building element");
        pipeline.push(command.to_element(registry)?);
    }
    Ok(pipeline)
}

/// Read a `.pipe` file and build its pipeline.
pub fn load_pipeline(path: &Path, registry: &HandlerRegistry) -> Result<Pipeline> {
    let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    build_pipeline(&text, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_path(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("specs").join(name)
    }

    /// Build a sample pipeline and collect what leaves its last stage.
    fn run_sample(name: &str) -> Vec<String> {
        let mut pipeline = load_pipeline(&sample_path(name), &HandlerRegistry::new()).unwrap();
        pipeline
            .records()
            .map(|r| r.unwrap().into_data())
            .collect()
    }

    #[test]
    fn test_parse_file() {
        let commands = parse_commands(r#"PIPE FILE "logs/app.log""#).unwrap();
        assert_eq!(
            commands,
            vec![Command::File {
                path: "logs/app.log".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_folder_options() {
        let cmd = parse_command(r#"FOLDER "data" keep "*.txt" KEEP /*.md/"#, 1).unwrap();
        assert_eq!(
            cmd,
            Command::Folder {
                path: "data".to_string(),
                keep: vec!["*.txt".to_string(), "*.md".to_string()],
                ignore: vec![],
            }
        );
    }

    #[test]
    fn test_parse_glob_prune() {
        let cmd = parse_command(r#"GLOB "." PRUNE "target" PRUNE ".git" IGNORE "*.lock""#, 1)
            .unwrap();
        match cmd {
            Command::Glob {
                prune, keep, ignore, ..
            } => {
                assert_eq!(prune, vec!["target", ".git"]);
                assert!(keep.is_empty());
                assert_eq!(ignore, vec!["*.lock"]);
            }
            other => panic!("Expected Glob, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_change_with_other_delimiter() {
        let cmd = parse_command(r#"CHANGE /"(\w+)"/ /'$1'/"#, 1).unwrap();
        assert_eq!(
            cmd,
            Command::Change {
                pattern: r#""(\w+)""#.to_string(),
                replacement: "'$1'".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_tofile_append() {
        assert_eq!(
            parse_command(r#"TOFILE "out.txt" APPEND"#, 1).unwrap(),
            Command::ToFile {
                path: "out.txt".to_string(),
                append: true
            }
        );
        assert_eq!(
            parse_command(r#"TOFILE "out.txt""#, 1).unwrap(),
            Command::ToFile {
                path: "out.txt".to_string(),
                append: false
            }
        );
    }

    #[test]
    fn test_roles() {
        let commands = parse_commands(
            r#"PIPE STRING "a"
| UPPER
| STDOUT
?"#,
        )
        .unwrap();
        let roles: Vec<Role> = commands.iter().map(|c| c.role()).collect();
        assert_eq!(roles, vec![Role::Source, Role::Stage, Role::Sink]);
    }

    #[test]
    fn test_unknown_command_is_unsupported() {
        let err = parse_commands("PIPE STRING \"a\"\n| REVERSE").unwrap_err();
        match err {
            PipelineError::Unsupported(what) => assert!(what.contains("REVERSE")),
            other => panic!("Expected Unsupported, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_errors_carry_line_numbers() {
        let err = parse_commands("# header\nPIPE FILE \"unclosed").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { line: 2, .. }));

        let err = parse_commands("PIPE STRING \"a\"\n| UPPER please").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { line: 2, .. }));

        let err = parse_commands("PIPE FOLDER \"x\" SORT \"name\"").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_source_must_come_first() {
        let err = build_pipeline("PIPE UPPER\n| STRING \"a\"", &HandlerRegistry::new())
            .unwrap_err();
        assert!(err.to_string().contains("UPPER cannot be the first stage"));
        assert!(build_pipeline("", &HandlerRegistry::new()).is_err());
    }

    #[test]
    fn test_bad_regex_fails_at_build() {
        let err = build_pipeline("PIPE STRING \"a\"\n| KEEP \"(\"", &HandlerRegistry::new())
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_conflicting_folder_patterns_fail_at_build() {
        let text = r#"PIPE FOLDER "specs" KEEP "*.pipe" IGNORE "*.data""#;
        let err = build_pipeline(text, &HandlerRegistry::new()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_string_with_separator_runs() {
        let sink = crate::sink::StringSink::new();
        let mut pipeline =
            build_pipeline(r#"PIPE STRING "a,b,c" SEP ",""#, &HandlerRegistry::new()).unwrap();
        pipeline.push(sink.clone());
        pipeline.run().unwrap();
        assert_eq!(sink.contents(), "a\nb\nc\n");
    }

    #[test]
    fn test_json_sink_from_dsl() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("errors.json");
        let text = format!(
            "PIPE STRING \"ERROR: a|ok|ERROR: b\" SEP \"|\"\n| KEEP \"ERROR\"\n| JSON \"{}\" DESC \"errors\"\n?",
            out.display()
        );
        let mut pipeline = build_pipeline(&text, &HandlerRegistry::new()).unwrap();
        assert_eq!(pipeline.run().unwrap(), 2);

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(doc["header"]["description"], "errors");
        assert_eq!(doc["header"]["count"], 2);
        assert_eq!(doc["records"][1]["data"], "ERROR: b");
        assert_eq!(doc["records"][1]["sequence_id"], 3);
    }

    #[test]
    fn test_registry_reaches_file_sources() {
        use crate::source::Handler;

        let registry = HandlerRegistry::new()
            .with(
                ".log",
                Handler::new("first-word", |path| {
                    let text = fs::read_to_string(path).unwrap_or_default();
                    let words: Vec<&str> =
                        text.lines().filter_map(|l| l.split_whitespace().next()).collect();
                    Box::new(StringSource::new(words.join("\n")))
                }),
            )
            .unwrap();
        let mut pipeline = load_pipeline(&sample_path("errors-only.pipe"), &registry).unwrap();
        let data: Vec<String> = pipeline
            .records()
            .map(|r| r.unwrap().into_data())
            .collect();
        assert_eq!(data, vec!["ERROR", "ERROR"]);
    }

    // --- Sample pipelines under specs/ ---

    #[test]
    fn test_sample_errors_only() {
        assert_eq!(
            run_sample("errors-only.pipe"),
            vec!["ERROR disk full", "ERROR network down"]
        );
    }

    #[test]
    fn test_sample_shout_notes() {
        assert_eq!(run_sample("shout-notes.pipe"), vec!["a.txt:1:ALPHA", "a.txt:2:BETA"]);
    }

    #[test]
    fn test_sample_tree_without_sub() {
        let mut data = run_sample("tree-without-sub.pipe");
        data.sort();
        assert_eq!(data, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_sample_squeeze_blanks() {
        assert_eq!(run_sample("squeeze-blanks.pipe"), vec!["x", "", "y"]);
    }

    #[test]
    fn test_sample_redact() {
        assert_eq!(
            run_sample("redact.pipe"),
            vec![
                "[error] disk full",
                "[warn] low memory",
                "",
                "[error] network down"
            ]
        );
    }

    #[test]
    fn test_every_sample_builds() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("specs");
        let mut built = 0;
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().is_some_and(|e| e == "pipe") {
                load_pipeline(&path, &HandlerRegistry::new())
                    .unwrap_or_else(|e| panic!("{}: {e}", path.display()));
                built += 1;
            }
        }
        assert!(built >= 5);
    }

    #[test]
    fn test_records_keep_source_identity() {
        let mut pipeline = load_pipeline(&sample_path("errors-only.pipe"), &HandlerRegistry::new())
            .unwrap();
        let records: Vec<Record> = pipeline.records().map(|r| r.unwrap()).collect();
        assert_eq!(records[0].resource_name(), "app.log");
        assert_eq!(records[0].sequence_id(), 2);
        assert_eq!(records[1].sequence_id(), 5);
    }
}
