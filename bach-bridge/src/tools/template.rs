//! Wire-command templates
//!
//! Most host commands are a flat sequence of words built from the call's
//! arguments, so their templates are plain data: a slice of [`Part`]s.
//! The few commands that expand to nested llll or to several lines use a
//! named [`Builder`].

use super::args::{format_float, ArgValue, ToolArgs};

/// One piece of a flat command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Part {
    /// Always emitted
    Lit(&'static str),
    /// Argument value, if present and non-empty
    Arg(&'static str),
    /// Argument value, or the literal when absent
    ArgOr(&'static str, &'static str),
    /// Argument value unless it equals the host's default
    ArgUnless(&'static str, i64),
    /// Word emitted when a boolean argument is true
    Flag(&'static str, &'static str),
    /// `prefix value` when the argument is present (`@mapping [pp 40]`)
    Prefixed(&'static str, &'static str),
    /// `prefix value` when the numeric argument is >= 0
    NonNegative(&'static str, &'static str),
    /// `[key value]`, falling back to `[key default]` when given one
    Bracketed(&'static str, &'static str, Option<&'static str>),
}

impl Part {
    fn render_into(&self, args: &ToolArgs, words: &mut Vec<String>) {
        match *self {
            Part::Lit(word) => words.push(word.to_string()),
            Part::Arg(name) => {
                if let Some(value) = args.present(name) {
                    words.push(value.render());
                }
            }
            Part::ArgOr(name, default) => match args.present(name) {
                Some(value) => words.push(value.render()),
                None => words.push(default.to_string()),
            },
            Part::ArgUnless(name, skip) => {
                if let Some(value) = args.present(name) {
                    if *value != ArgValue::Int(skip) {
                        words.push(value.render());
                    }
                }
            }
            Part::Flag(name, word) => {
                if args.flag(name) {
                    words.push(word.to_string());
                }
            }
            Part::Prefixed(name, prefix) => {
                if let Some(value) = args.present(name) {
                    words.push(format!("{prefix} {}", value.render()));
                }
            }
            Part::NonNegative(name, prefix) => {
                if let Some(value) = args.present(name) {
                    if value.as_f64().is_some_and(|n| n >= 0.0) {
                        words.push(format!("{prefix} {}", value.render()));
                    }
                }
            }
            Part::Bracketed(name, key, default) => match (args.present(name), default) {
                (Some(value), _) => words.push(format!("[{key} {}]", value.render())),
                (None, Some(default)) => words.push(format!("[{key} {default}]")),
                (None, None) => {}
            },
        }
    }
}

/// Commands that are not a flat word sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builder {
    /// One `addchord` line per note
    AddNotes,
    /// `[slotinfo [N [type ..] [name ..] ...]]`
    DefineSlot,
    /// Fixed reset sequence
    NewDefaultScore,
}

/// Reset sequence for a blank one-voice treble score
const DEFAULT_SCORE_COMMANDS: &[&str] = &[
    "clear",
    "numvoices 1",
    "clefs G",
    "stafflines 5",
    "numparts 1",
    "bgcolor 1.0 1.0 1.0 1.0",
    "notecolor 0.0 0.0 0.0 1.0",
    "staffcolor 0.0 0.0 0.0 1.0",
    "voicenames",
    "domain 10000.0",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Template {
    Parts(&'static [Part]),
    Build(Builder),
}

impl Template {
    /// Render to one or more wire lines
    pub fn render(&self, args: &ToolArgs) -> Result<Vec<String>, String> {
        match self {
            Template::Parts(parts) => {
                let mut words = Vec::with_capacity(parts.len());
                for part in parts.iter() {
                    part.render_into(args, &mut words);
                }
                let line = words.join(" ");
                if line.trim().is_empty() {
                    return Err("command rendered empty".into());
                }
                Ok(vec![line])
            }
            Template::Build(Builder::AddNotes) => add_notes(args),
            Template::Build(Builder::DefineSlot) => define_slot(args).map(|line| vec![line]),
            Template::Build(Builder::NewDefaultScore) => Ok(DEFAULT_SCORE_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect()),
        }
    }
}

fn add_notes(args: &ToolArgs) -> Result<Vec<String>, String> {
    let notes = match args.get("notes") {
        Some(ArgValue::Notes(notes)) if !notes.is_empty() => notes,
        _ => return Err("notes must contain at least one note".into()),
    };

    let voice = match args.get("voice") {
        Some(ArgValue::Int(v)) if *v < 1 => return Err("voice must be > 0".into()),
        Some(ArgValue::Int(v)) if *v != 1 => Some(*v),
        _ => None,
    };

    Ok(notes
        .iter()
        .map(|note| match voice {
            Some(v) => format!("addchord {v} {}", note.render_chord()),
            None => format!("addchord {}", note.render_chord()),
        })
        .collect())
}

fn define_slot(args: &ToolArgs) -> Result<String, String> {
    let slot = match args.get("slot_number") {
        Some(ArgValue::Int(n)) if *n >= 1 => *n,
        Some(_) => return Err("slot_number must be >= 1".into()),
        None => return Err("missing required argument 'slot_number'".into()),
    };

    let mut fields = Vec::new();
    for key in ["type", "name", "key"] {
        if let Some(value) = args.present(key) {
            fields.push(format!("[{key} {}]", value.render()));
        }
    }
    if let (Some(min), Some(max)) = (args.number("range_min"), args.number("range_max")) {
        fields.push(format!("[range {} {}]", format_float(min), format_float(max)));
    }
    if let Some(value) = args.present("representation") {
        fields.push(format!("[representation {}]", value.render()));
    }
    if let Some(slope) = args.number("slope") {
        fields.push(format!("[slope {}]", format_float(slope)));
    }
    for key in ["width", "default"] {
        if let Some(value) = args.present(key) {
            fields.push(format!("[{key} {}]", value.render()));
        }
    }

    if fields.is_empty() {
        return Err("no slotinfo fields given".into());
    }
    Ok(format!("[slotinfo [{slot} {}]]", fields.join(" ")))
}
