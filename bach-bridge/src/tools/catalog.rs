//! Static tool catalog
//!
//! Every tool the model may call, with its parameters, wire template,
//! reply policy and tier. The table is data; nothing here does I/O.

use serde_json::{json, Value};

use super::template::{Builder, Part, Template};
use crate::config::ToolTier;

macro_rules! tool_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Closed set of tools, one variant per catalog entry
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ToolKind {
            $($variant),+
        }

        impl ToolKind {
            pub const ALL: &'static [ToolKind] = &[$(ToolKind::$variant),+];

            /// Name the model calls the tool by
            pub fn name(&self) -> &'static str {
                match self {
                    $(ToolKind::$variant => $name),+
                }
            }
        }
    };
}

tool_kinds! {
    // Core
    Dump => "dump",
    SendScore => "send_score_to_max",
    AddChord => "addchord",
    AddNotes => "add_notes",
    Clear => "clear",
    NewDefaultScore => "new_default_score",
    Play => "play",
    NumVoices => "numvoices",
    Clefs => "clefs",
    Sel => "sel",
    Delete => "delete",
    ProcessMessage => "send_process_message_to_max",
    // Extended
    AddChords => "addchords",
    Subroll => "subroll",
    GetNumVoices => "getnumvoices",
    GetNumChords => "getnumchords",
    GetNumNotes => "getnumnotes",
    GetLength => "get_length",
    GetCurrentChord => "getcurrentchord",
    GetMarker => "get_marker",
    NumParts => "numparts",
    StaffLines => "stafflines",
    VoiceNames => "voicenames",
    InsertVoice => "insertvoice",
    DeleteVoice => "deletevoice",
    Domain => "domain",
    SetAppearance => "set_appearance",
    ClearSelection => "clearselection",
    Tail => "tail",
    Legato => "legato",
    Glissando => "glissando",
    Distribute => "distribute",
    ExplodeChords => "explodechords",
    Merge => "merge",
    AddMarker => "addmarker",
    DeleteMarker => "deletemarker",
    DefineSlot => "define_slot",
    CopySlot => "copyslot",
    EraseSlot => "eraseslot",
    EraseBreakpoints => "erasebreakpoints",
    DeleteSlotItem => "deleteslotitem",
    Dynamics2Velocities => "dynamics2velocities",
    Velocities2Dynamics => "velocities2dynamics",
    ExportMidi => "exportmidi",
    ExportImage => "exportimage",
    Write => "write",
    WriteTxt => "writetxt",
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    /// String checked for balanced brackets
    Llll,
    /// Full score: optional `roll` selector followed by llll
    Score,
    /// List of note objects
    NoteList,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, ty: ParamType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            description,
        }
    }

    /// JSON schema of this parameter
    pub fn schema(&self) -> Value {
        match self.ty {
            ParamType::String | ParamType::Llll | ParamType::Score => {
                json!({"type": "string", "description": self.description})
            }
            ParamType::Integer => json!({"type": "integer", "description": self.description}),
            ParamType::Number => json!({"type": "number", "description": self.description}),
            ParamType::Boolean => json!({"type": "boolean", "description": self.description}),
            ParamType::NoteList => json!({
                "type": "array",
                "description": self.description,
                "items": {
                    "type": "object",
                    "properties": {
                        "onset_ms": {"type": "number", "description": "Onset in ms"},
                        "pitch": {"type": "integer", "description": "Midicents (6000 = middle C)"},
                        "duration": {"type": "number", "description": "Duration in ms, > 0"},
                        "velocity": {"type": "integer", "description": "0-127 (default 100)"},
                        "dynamics": {"type": "string", "description": "e.g. 'mf' or 'p<'"},
                        "articulation": {"type": "string", "description": "e.g. 'staccato'"},
                        "notehead": {"type": "string", "description": "e.g. 'diamond'"}
                    },
                    "required": ["onset_ms", "pitch", "duration"]
                }
            }),
        }
    }
}

/// Whether a tool waits for the host to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPolicy {
    FireAndForget,
    /// Wait for the next inbound line; `None` uses the configured timeout
    Await { timeout_secs: Option<u64> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    pub template: Template,
    pub reply: ReplyPolicy,
    pub tier: ToolTier,
}

impl ToolSpec {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Visible to the model at `tier`
    pub fn advertised_at(&self, tier: ToolTier) -> bool {
        match tier {
            ToolTier::Core => self.tier == ToolTier::Core,
            ToolTier::Extended => true,
        }
    }

    /// Function schema in the chat API's tool format
    pub fn function_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.to_string(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

use ParamType as T;

const fn req(name: &'static str, ty: ParamType, description: &'static str) -> ParamSpec {
    ParamSpec::required(name, ty, description)
}

const fn opt(name: &'static str, ty: ParamType, description: &'static str) -> ParamSpec {
    ParamSpec::optional(name, ty, description)
}

const TIMEOUT: ParamSpec = opt("timeout_seconds", T::Number, "Seconds to wait for the reply, at most 3600");

const fn fire(
    kind: ToolKind,
    description: &'static str,
    params: &'static [ParamSpec],
    template: Template,
    tier: ToolTier,
) -> ToolSpec {
    ToolSpec {
        kind,
        description,
        params,
        template,
        reply: ReplyPolicy::FireAndForget,
        tier,
    }
}

const fn query(
    kind: ToolKind,
    description: &'static str,
    params: &'static [ParamSpec],
    template: Template,
    timeout_secs: u64,
) -> ToolSpec {
    ToolSpec {
        kind,
        description,
        params,
        template,
        reply: ReplyPolicy::Await {
            timeout_secs: Some(timeout_secs),
        },
        tier: ToolTier::Extended,
    }
}

const CORE: ToolTier = ToolTier::Core;
const EXT: ToolTier = ToolTier::Extended;

pub static CATALOG: &[ToolSpec] = &[
    // ==================== Core: read ====================
    ToolSpec {
        kind: ToolKind::Dump,
        description: "READ the current score. Call before editing. mode 'body' (default) for notes, \
                      'header' for voices/clefs, 'markers', 'pitches', 'onsets' or 'slotinfo'. Read-only.",
        params: &[
            opt("mode", T::String, "'body' | 'header' | 'pitches' | 'onsets' | 'markers' | 'slotinfo'"),
            opt("selection", T::Boolean, "Only dump selected items"),
            opt("dump_options", T::String, "Extra words passed through, e.g. 'keys clefs'"),
            TIMEOUT,
        ],
        template: Template::Parts(&[
            Part::Lit("dump"),
            Part::Flag("selection", "selection"),
            Part::ArgOr("mode", "body"),
            Part::Arg("dump_options"),
        ]),
        reply: ReplyPolicy::Await {
            timeout_secs: Some(15),
        },
        tier: CORE,
    },
    // ==================== Core: write ====================
    fire(
        ToolKind::SendScore,
        "REPLACE the entire score. Format: 'roll [VOICE1] [VOICE2] ...', one llll per voice.",
        &[req(
            "score_llll",
            T::Score,
            "Full score, e.g. 'roll [ [ 0. [ 6000. 500. 100 0 ] 0 ] 0 ]'",
        )],
        Template::Parts(&[Part::Arg("score_llll")]),
        CORE,
    ),
    fire(
        ToolKind::AddChord,
        "INSERT one chord without replacing anything. Format: '[onset_ms [pitch_cents dur_ms vel] ...]'.",
        &[
            req("chord_llll", T::Llll, "e.g. '[1000 [6000 500 100] [6400 500 90]]'"),
            opt("voice", T::Integer, "Target voice, 1-indexed (default 1)"),
            opt("select", T::Boolean, "Also select the added chord"),
        ],
        Template::Parts(&[
            Part::Lit("addchord"),
            Part::ArgUnless("voice", 1),
            Part::Arg("chord_llll"),
            Part::Flag("select", "@sel 1"),
        ]),
        CORE,
    ),
    fire(
        ToolKind::AddNotes,
        "INSERT single notes, one chord per note, into one voice.",
        &[
            req("notes", T::NoteList, "Notes to add"),
            opt("voice", T::Integer, "Target voice, 1-indexed (default 1)"),
        ],
        Template::Build(Builder::AddNotes),
        CORE,
    ),
    // ==================== Core: reset ====================
    fire(
        ToolKind::Clear,
        "ERASE all notes, chords and markers. Keeps voices, clefs and appearance.",
        &[],
        Template::Parts(&[Part::Lit("clear")]),
        CORE,
    ),
    fire(
        ToolKind::NewDefaultScore,
        "Full reset: clear and return to one treble voice, white background, 10 second domain.",
        &[],
        Template::Build(Builder::NewDefaultScore),
        CORE,
    ),
    // ==================== Core: playback and structure ====================
    fire(
        ToolKind::Play,
        "Start playback. Omit start/end to play from the cursor to the end.",
        &[
            opt("start_ms", T::Number, "Start position in ms"),
            opt("end_ms", T::Number, "End position in ms"),
        ],
        Template::Parts(&[Part::Lit("play"), Part::Arg("start_ms"), Part::Arg("end_ms")]),
        CORE,
    ),
    fire(
        ToolKind::NumVoices,
        "Set the number of voices. Reducing it deletes the removed voices' content.",
        &[req("count", T::Integer, "Number of voices, > 0")],
        Template::Parts(&[Part::Lit("numvoices"), Part::Arg("count")]),
        CORE,
    ),
    fire(
        ToolKind::Clefs,
        "Set the clef of each voice, space separated. Symbols: G F FG alto perc auto none G8 F8.",
        &[req("clefs_list", T::String, "e.g. 'G' or 'G F' or 'FG'")],
        Template::Parts(&[Part::Lit("clefs"), Part::Arg("clefs_list")]),
        CORE,
    ),
    fire(
        ToolKind::Sel,
        "Select items before delete/tail/legato. e.g. 'all', 'notes', 'chord 3', 'note if cents==6000'.",
        &[req("arguments", T::String, "Selection expression")],
        Template::Parts(&[Part::Lit("sel"), Part::Arg("arguments")]),
        CORE,
    ),
    fire(
        ToolKind::Delete,
        "Delete the SELECTED items. Call sel first. Use clear to wipe the whole score.",
        &[
            opt("transferslots", T::String, "Slots to hand to the neighbour: 'all' | 'auto' | '20 21'"),
            opt("empty", T::Boolean, "Also transfer empty slots"),
        ],
        Template::Parts(&[
            Part::Lit("delete"),
            Part::Prefixed("transferslots", "@transferslots"),
            Part::Flag("empty", "@empty 1"),
        ]),
        CORE,
    ),
    fire(
        ToolKind::ProcessMessage,
        "Send a raw command with no dedicated tool. Last resort; fire-and-forget.",
        &[req("message", T::String, "Raw command, e.g. 'stop'")],
        Template::Parts(&[Part::Arg("message")]),
        CORE,
    ),
    // ==================== Extended: write ====================
    fire(
        ToolKind::AddChords,
        "INSERT chords across voices at once. One voice llll per voice; [] skips a voice.",
        &[
            req("chords_llll", T::Llll, "e.g. '[[0 [6000 500 100]] [500 [6200 500 100]]] []'"),
            opt("offset_ms", T::Number, "Shift all onsets by this many ms"),
        ],
        Template::Parts(&[
            Part::Lit("addchords"),
            Part::Arg("offset_ms"),
            Part::Arg("chords_llll"),
        ]),
        EXT,
    ),
    // ==================== Extended: queries ====================
    query(
        ToolKind::Subroll,
        "Extract a time/voice slice of the score as llll (read-only).",
        &[
            opt("voices", T::String, "Voice list e.g. '[1 2]', '[]' = all"),
            opt("time_lapse", T::String, "Time range e.g. '[1000 3000]', '[]' = all"),
            opt("selective_options", T::String, "e.g. '[body]' or '[clefs markers body]'"),
            opt("onset_only", T::Boolean, "Only notes whose onset is inside the range"),
            TIMEOUT,
        ],
        Template::Parts(&[
            Part::Lit("subroll"),
            Part::Flag("onset_only", "onset"),
            Part::ArgOr("voices", "[]"),
            Part::ArgOr("time_lapse", "[]"),
            Part::Arg("selective_options"),
        ]),
        15,
    ),
    query(
        ToolKind::GetNumVoices,
        "Return the voice count.",
        &[opt("query_label", T::String, "Label echoed back with the answer"), TIMEOUT],
        Template::Parts(&[Part::Lit("getnumvoices"), Part::Arg("query_label")]),
        15,
    ),
    query(
        ToolKind::GetNumChords,
        "Return the chord count per voice.",
        &[opt("query_label", T::String, "Label echoed back with the answer"), TIMEOUT],
        Template::Parts(&[Part::Lit("getnumchords"), Part::Arg("query_label")]),
        15,
    ),
    query(
        ToolKind::GetNumNotes,
        "Return the note count per chord per voice.",
        &[opt("query_label", T::String, "Label echoed back with the answer"), TIMEOUT],
        Template::Parts(&[Part::Lit("getnumnotes"), Part::Arg("query_label")]),
        15,
    ),
    query(
        ToolKind::GetLength,
        "Return the total score duration in ms.",
        &[TIMEOUT],
        Template::Parts(&[Part::Lit("getlength")]),
        10,
    ),
    query(
        ToolKind::GetCurrentChord,
        "Return pitches and velocities at the playback cursor.",
        &[TIMEOUT],
        Template::Parts(&[Part::Lit("getcurrentchord")]),
        10,
    ),
    query(
        ToolKind::GetMarker,
        "Query markers by name. Empty names returns all.",
        &[
            opt("names", T::String, "Space separated names (empty = all)"),
            opt("name_first", T::Boolean, "Output the name before the position"),
            TIMEOUT,
        ],
        Template::Parts(&[
            Part::Lit("getmarker"),
            Part::Flag("name_first", "@namefirst 1"),
            Part::Arg("names"),
        ]),
        10,
    ),
    // ==================== Extended: voices ====================
    fire(
        ToolKind::NumParts,
        "Group voices into ensemble staves. Integers must sum to the voice count.",
        &[req("parts", T::String, "e.g. '1 1' or '2'")],
        Template::Parts(&[Part::Lit("numparts"), Part::Arg("parts")]),
        EXT,
    ),
    fire(
        ToolKind::StaffLines,
        "Set staff line count per voice. 5 = standard, 1 = single line, 0 = invisible.",
        &[req("value", T::String, "e.g. '5' or '1 5 5'")],
        Template::Parts(&[Part::Lit("stafflines"), Part::Arg("value")]),
        EXT,
    ),
    fire(
        ToolKind::VoiceNames,
        "Set voice name labels, space separated; [] skips a voice.",
        &[req("value", T::String, "e.g. 'Violin Cello'")],
        Template::Parts(&[Part::Lit("voicenames"), Part::Arg("value")]),
        EXT,
    ),
    fire(
        ToolKind::InsertVoice,
        "Insert a new empty voice at a 1-indexed position.",
        &[
            req("voice_number", T::Integer, "Insertion position"),
            opt("voice_or_ref", T::String, "Voice to copy properties from, or llll content"),
        ],
        Template::Parts(&[
            Part::Lit("insertvoice"),
            Part::Arg("voice_number"),
            Part::Arg("voice_or_ref"),
        ]),
        EXT,
    ),
    fire(
        ToolKind::DeleteVoice,
        "Delete a voice and all its content.",
        &[req("voice_number", T::Integer, "1-indexed voice")],
        Template::Parts(&[Part::Lit("deletevoice"), Part::Arg("voice_number")]),
        EXT,
    ),
    // ==================== Extended: appearance ====================
    fire(
        ToolKind::Domain,
        "Set the visible time window: one value = duration, two = start and end (ms).",
        &[
            req("start_or_duration_ms", T::Number, "Duration, or range start"),
            opt("end_ms", T::Number, "Range end"),
            opt("pad_pixels", T::Number, "Ending pad in pixels"),
        ],
        Template::Parts(&[
            Part::Lit("domain"),
            Part::Arg("start_or_duration_ms"),
            Part::Arg("end_ms"),
            Part::Arg("pad_pixels"),
        ]),
        EXT,
    ),
    fire(
        ToolKind::SetAppearance,
        "Set a display attribute, e.g. zoom, ruler, showvelocity, selectioncolor.",
        &[
            req("attribute", T::String, "Attribute name"),
            req("value", T::String, "Value, e.g. '150' or '0.8 0. 0.8 1.'"),
        ],
        Template::Parts(&[Part::Arg("attribute"), Part::Arg("value")]),
        EXT,
    ),
    fire(
        ToolKind::ClearSelection,
        "Deselect everything.",
        &[],
        Template::Parts(&[Part::Lit("clearselection")]),
        EXT,
    ),
    // ==================== Extended: note editing ====================
    fire(
        ToolKind::Tail,
        "Set or modify note ends of the selection, e.g. '1000' or '= tail + 500'.",
        &[req("expression", T::String, "Value or equation")],
        Template::Parts(&[Part::Lit("tail"), Part::Arg("expression")]),
        EXT,
    ),
    fire(
        ToolKind::Legato,
        "Extend each selected note to the next onset.",
        &[opt("trim_or_extend", T::String, "'' | 'trim' | 'extend'")],
        Template::Parts(&[Part::Lit("legato"), Part::Arg("trim_or_extend")]),
        EXT,
    ),
    fire(
        ToolKind::Glissando,
        "Apply a glissando to the selected notes.",
        &[
            opt("trim_or_extend", T::String, "'' | 'trim' | 'extend'"),
            opt("slope", T::Number, "Curve slope, -1 to 1 (0 = straight)"),
        ],
        Template::Parts(&[
            Part::Lit("glissando"),
            Part::Arg("trim_or_extend"),
            Part::ArgOr("slope", "0.0"),
        ]),
        EXT,
    ),
    fire(
        ToolKind::Distribute,
        "Spread the selected onsets evenly between the first and last.",
        &[],
        Template::Parts(&[Part::Lit("distribute")]),
        EXT,
    ),
    fire(
        ToolKind::ExplodeChords,
        "Split chords into single-note chords.",
        &[opt("selection", T::Boolean, "Selected chords only")],
        Template::Parts(&[Part::Lit("explodechords"), Part::Flag("selection", "selection")]),
        EXT,
    ),
    fire(
        ToolKind::Merge,
        "Merge nearby chords or notes. -1 skips a dimension.",
        &[
            req("threshold_ms", T::Number, "Time threshold in ms"),
            req("threshold_cents", T::Number, "Pitch threshold in cents"),
            opt("selection", T::Boolean, "Selected items only"),
            opt("time_policy", T::Integer, "-1 leftmost, 0 average, 1 rightmost"),
            opt("pitch_policy", T::Integer, "-1 bottom, 0 average, 1 top"),
        ],
        Template::Parts(&[
            Part::Lit("merge"),
            Part::Flag("selection", "selection"),
            Part::Arg("threshold_ms"),
            Part::Arg("threshold_cents"),
            Part::Arg("time_policy"),
            Part::Arg("pitch_policy"),
        ]),
        EXT,
    ),
    // ==================== Extended: markers ====================
    fire(
        ToolKind::AddMarker,
        "Add a named marker at a time position.",
        &[
            req("position", T::String, "Time in ms, 'cursor' or 'end'"),
            req("name_or_names", T::String, "Marker name"),
            opt("role", T::String, "Marker role"),
            opt("content", T::Llll, "Marker content"),
        ],
        Template::Parts(&[
            Part::Lit("addmarker"),
            Part::Arg("position"),
            Part::Arg("name_or_names"),
            Part::Arg("role"),
            Part::Arg("content"),
        ]),
        EXT,
    ),
    fire(
        ToolKind::DeleteMarker,
        "Delete the first marker with the given name.",
        &[req("marker_names", T::String, "Name to match")],
        Template::Parts(&[Part::Lit("deletemarker"), Part::Arg("marker_names")]),
        EXT,
    ),
    // ==================== Extended: slots ====================
    fire(
        ToolKind::DefineSlot,
        "Configure a slot. Defaults: 20 dynamics, 22 articulations, 23 notehead.",
        &[
            req("slot_number", T::Integer, "Slot index, 1+"),
            opt("type", T::String, "function | int | float | text | articulations | ..."),
            opt("name", T::String, "Display name"),
            opt("key", T::String, "Hotkey character"),
            opt("range_min", T::Number, "Y-axis minimum"),
            opt("range_max", T::Number, "Y-axis maximum"),
            opt("representation", T::String, "Unit label, e.g. 'Hz'"),
            opt("slope", T::Number, "0 linear, 0.5 log-like"),
            opt("width", T::String, "Pixels or 'temporal'"),
            opt("default", T::String, "Default value"),
        ],
        Template::Build(Builder::DefineSlot),
        EXT,
    ),
    fire(
        ToolKind::CopySlot,
        "Copy slot content between slots for the selected notes.",
        &[
            req("slot_from", T::String, "Number, name or 'active'"),
            req("slot_to", T::String, "Number, name or 'active'"),
        ],
        Template::Parts(&[Part::Lit("copyslot"), Part::Arg("slot_from"), Part::Arg("slot_to")]),
        EXT,
    ),
    fire(
        ToolKind::EraseSlot,
        "Clear slot data of the selected notes.",
        &[req("slot", T::String, "Number, name, 'active' or 'all'")],
        Template::Parts(&[Part::Lit("eraseslot"), Part::Arg("slot")]),
        EXT,
    ),
    fire(
        ToolKind::EraseBreakpoints,
        "Remove pitch breakpoints from the selected notes.",
        &[],
        Template::Parts(&[Part::Lit("erasebreakpoints")]),
        EXT,
    ),
    fire(
        ToolKind::DeleteSlotItem,
        "Delete one slot item of the selected notes.",
        &[
            req("slot", T::String, "Slot number or name"),
            req("position", T::String, "Index or wrapped X, e.g. '[0.7]'"),
            opt("thresh", T::Number, "X matching tolerance"),
        ],
        Template::Parts(&[
            Part::Lit("deleteslotitem"),
            Part::Arg("slot"),
            Part::Arg("position"),
            Part::Prefixed("thresh", "@thresh"),
        ]),
        EXT,
    ),
    // ==================== Extended: dynamics ====================
    fire(
        ToolKind::Dynamics2Velocities,
        "Convert slot 20 dynamics to MIDI velocities.",
        &[
            opt("selection", T::Boolean, "Selected only"),
            opt("mapping", T::String, "e.g. '[pp 40] [p 55] [ff 115]'"),
            opt("maxchars", T::Integer, "Spectrum width (default 4)"),
            opt("exp", T::Number, "Curve exponent (default 0.8)"),
            opt("breakpointmode", T::Integer, "0 keep, 1 add, 2 clear and add"),
        ],
        Template::Parts(&[
            Part::Lit("dynamics2velocities"),
            Part::Flag("selection", "selection"),
            Part::Prefixed("mapping", "@mapping"),
            Part::NonNegative("maxchars", "@maxchars"),
            Part::NonNegative("exp", "@exp"),
            Part::NonNegative("breakpointmode", "@breakpointmode"),
        ]),
        EXT,
    ),
    fire(
        ToolKind::Velocities2Dynamics,
        "Infer dynamics from MIDI velocities into slot 20.",
        &[
            opt("selection", T::Boolean, "Selected only"),
            opt("mapping", T::String, "e.g. '[pp 20] [p 40] [ff 125]'"),
            opt("maxchars", T::Integer, "Spectrum width (default 4)"),
            opt("exp", T::Number, "Curve exponent (default 0.8)"),
        ],
        Template::Parts(&[
            Part::Lit("velocities2dynamics"),
            Part::Flag("selection", "selection"),
            Part::Prefixed("mapping", "@mapping"),
            Part::NonNegative("maxchars", "@maxchars"),
            Part::NonNegative("exp", "@exp"),
        ]),
        EXT,
    ),
    // ==================== Extended: export ====================
    fire(
        ToolKind::ExportMidi,
        "Export a MIDI file. Empty filename opens a dialog.",
        &[
            opt("filename", T::String, "e.g. 'score.mid'"),
            opt("voices", T::String, "Voices to export, e.g. '1 3' (empty = all)"),
            opt("format", T::Integer, "0 single track, 1 multi track (default)"),
            opt("resolution", T::Integer, "Ticks per beat (default 960)"),
        ],
        Template::Parts(&[
            Part::Lit("exportmidi"),
            Part::Arg("filename"),
            Part::Lit("[exportmarkers 1]"),
            Part::Bracketed("voices", "voices", None),
            Part::Bracketed("format", "format", Some("1")),
            Part::Bracketed("resolution", "resolution", Some("960")),
        ]),
        EXT,
    ),
    fire(
        ToolKind::ExportImage,
        "Export a PNG image. view: 'line' (default), 'raw', 'multiline', 'scroll'.",
        &[
            opt("filename", T::String, "e.g. '/tmp/score.png'"),
            opt("view", T::String, "'line' | 'raw' | 'multiline' | 'scroll'"),
            opt("mspersystem", T::Number, "System length in ms"),
            opt("dpi", T::Integer, "DPI (default 72)"),
        ],
        Template::Parts(&[
            Part::Lit("exportimage"),
            Part::Arg("filename"),
            Part::Prefixed("view", "@view"),
            Part::NonNegative("mspersystem", "@mspersystem"),
            Part::NonNegative("dpi", "@dpi"),
        ]),
        EXT,
    ),
    fire(
        ToolKind::Write,
        "SAVE the score in native llll format. Empty filename opens a dialog.",
        &[opt("filename", T::String, "e.g. 'score.llll'")],
        Template::Parts(&[Part::Lit("write"), Part::Arg("filename")]),
        EXT,
    ),
    fire(
        ToolKind::WriteTxt,
        "Save the score as readable text. Empty filename opens a dialog.",
        &[
            opt("filename", T::String, "e.g. 'score.txt'"),
            opt("maxdecimals", T::Integer, "Float precision (-1 = default)"),
        ],
        Template::Parts(&[
            Part::Lit("writetxt"),
            Part::Arg("filename"),
            Part::NonNegative("maxdecimals", "@maxdecimals"),
        ]),
        EXT,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_kind_has_exactly_one_entry() {
        assert_eq!(CATALOG.len(), ToolKind::ALL.len());
        let kinds: HashSet<ToolKind> = CATALOG.iter().map(|s| s.kind).collect();
        assert_eq!(kinds.len(), CATALOG.len());
    }

    #[test]
    fn test_tier_sizes() {
        let core = CATALOG.iter().filter(|s| s.tier == ToolTier::Core).count();
        assert_eq!(core, 12);
        assert_eq!(CATALOG.len() - core, 35);
    }

    #[test]
    fn test_param_names_unique_per_tool() {
        for spec in CATALOG {
            let names: HashSet<&str> = spec.params.iter().map(|p| p.name).collect();
            assert_eq!(names.len(), spec.params.len(), "{}", spec.name());
        }
    }

    #[test]
    fn test_await_tools_accept_timeout() {
        for spec in CATALOG {
            if matches!(spec.reply, ReplyPolicy::Await { .. }) {
                assert!(
                    spec.params.iter().any(|p| p.name == "timeout_seconds"),
                    "{}",
                    spec.name()
                );
            }
        }
    }

    #[test]
    fn test_function_schema_shape() {
        let spec = CATALOG
            .iter()
            .find(|s| s.kind == ToolKind::AddChord)
            .unwrap();
        let schema = spec.function_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "addchord");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
        assert_eq!(
            schema["function"]["parameters"]["properties"]["voice"]["type"],
            "integer"
        );
        assert_eq!(
            schema["function"]["parameters"]["required"],
            serde_json::json!(["chord_llll"])
        );
    }

    #[test]
    fn test_note_list_schema_is_array() {
        let spec = CATALOG
            .iter()
            .find(|s| s.kind == ToolKind::AddNotes)
            .unwrap();
        let notes = &spec.function_schema()["function"]["parameters"]["properties"]["notes"];
        assert_eq!(notes["type"], "array");
        assert_eq!(notes["items"]["type"], "object");
    }
}
