//! Structured data out of free-form model output
//!
//! Nothing here returns an error to the caller. A debate that
//! cannot be read becomes `DebateTranscript::fallback()`; a story
//! without a readable state block keeps its prose and carries no
//! state update.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Range;
use log::{debug, warn};

pub const DHARMA_MIN: i64 = -100;
pub const DHARMA_MAX: i64 = 100;

const FENCE: &str = "```";

// ===== Debate Shape =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateTurn
{   pub speaker: String
  , pub content: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateTranscript
{   /// Turns in speaking order
    pub debate: Vec<DebateTurn>
  , pub consensus: String
}

impl DebateTranscript
{   /// Placeholder shown when the model ignored the format
    pub fn fallback() -> Self
    {   DebateTranscript
        {   debate: vec![
              DebateTurn
              {   speaker: "System".to_string()
                , content: "Council connection unstable. \
                    Proceeding with default protocol.".to_string()
              }
            ]
          , consensus: "Proceed with caution.".to_string()
        }
    }
}

// ===== Story Shape =====

/// Player state block that closes a story chapter.
///
/// Fields of the wrong type are dropped one by one rather than
/// rejecting the block. `dharma` is clamped to -100..=100;
/// everything else is passed through as the model wrote it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate
{   pub image_prompt: Option<String>
  , pub dharma: Option<i64>
  , pub karma: Option<i64>
  , /// Acquisition order
    pub inventory: Option<Vec<String>>
  , pub choices: Vec<String>
}

impl StateUpdate
{   pub fn from_object(object: &Map<String, Value>) -> Self
    {   StateUpdate
        {   image_prompt: object.get("image_prompt")
              .and_then(Value::as_str)
              .map(str::to_string)
          , dharma: object.get("dharma")
              .and_then(as_integer)
              .map(|d| d.clamp(DHARMA_MIN, DHARMA_MAX))
          , karma: object.get("karma").and_then(as_integer)
          , inventory: object.get("inventory").and_then(as_strings)
          , choices: object.get("choices")
              .and_then(as_strings)
              .unwrap_or_default()
        }
    }

    /// The prompt asks for exactly three choices
    pub fn has_three_choices(&self) -> bool
    {   self.choices.len() == 3
    }
}

fn as_integer(value: &Value) -> Option<i64>
{   value.as_i64()
      .or_else(|| {
        value.as_f64()
          .filter(|f| f.is_finite())
          .map(|f| f.round() as i64)
      })
}

fn as_strings(value: &Value) -> Option<Vec<String>>
{   value.as_array().map(|items| {
      items.iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
    })
}

/// One generated chapter split into prose and state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryTurn
{   pub narrative: String
  , pub state: Option<StateUpdate>
}

// ===== Fences =====

/// Remove every markdown fence marker and trim. A language tag
/// is dropped only when it opens a block (tag then newline), so
/// prose glued to a closing fence survives. Text without fences
/// only gets trimmed.
pub fn strip_fences(text: &str) -> String
{   let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(FENCE)
    {   out.push_str(&rest[..pos]);
        let after = &rest[pos + FENCE.len()..];
        let tag_len = after
          .find(|c: char| !is_tag_char(c))
          .unwrap_or(after.len());
        let opens_block = after[tag_len..].is_empty()
          || after[tag_len..].starts_with(['\n', '\r']);
        rest = if opens_block
        {   &after[tag_len..]
        } else
        {   after
        };
    }
    out.push_str(rest);
    out.trim().to_string()
}

fn is_tag_char(c: char) -> bool
{   c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+')
}

// ===== JSON Location =====

/// Byte ranges of top-level `{...}` regions, in order.
///
/// One pass with a stack of open braces. Quotes are tracked only
/// while some brace is open, and a string never spans a newline
/// (JSON strings cannot), so prose punctuation and stray `{` do
/// not hide a later object.
fn object_regions(text: &str) -> Vec<Range<usize>>
{   let mut open: Vec<usize> = Vec::new();
    let mut pairs: Vec<Range<usize>> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate()
    {   if in_string
        {   if escaped
            {   escaped = false;
            } else if b == b'\\'
            {   escaped = true;
            } else if b == b'"' || b == b'\n'
            {   in_string = false;
            }
            continue;
        }
        match b
        {   b'"' if !open.is_empty() => in_string = true
          , b'{' => open.push(i)
          , b'}' => {
              if let Some(start) = open.pop()
              {   pairs.push(start..i + 1);
              }
            }
          , _ => {}
        }
    }

    // Pairs arrive in closing order; a pair is nested when some
    // later-closing pair opened before it.
    let mut min_start = usize::MAX;
    let mut regions: Vec<Range<usize>> = pairs
      .into_iter()
      .rev()
      .filter(|range| {
        let outer = range.start < min_start;
        min_start = min_start.min(range.start);
        outer
      })
      .collect();
    regions.reverse();
    regions
}

/// Last top-level region that parses as a JSON object
fn locate_trailing_object(text: &str)
  -> Option<(Map<String, Value>, Range<usize>)>
{   object_regions(text)
      .into_iter()
      .rev()
      .find_map(|range| {
        match serde_json::from_str::<Value>(&text[range.clone()])
        {   Ok(Value::Object(map)) => Some((map, range))
          , _ => None
        }
      })
}

// ===== Extractors =====

/// Read a debate transcript. Never fails; unreadable output
/// yields `DebateTranscript::fallback()`.
pub fn extract_debate(raw: &str) -> DebateTranscript
{   match parse_debate(raw)
    {   Ok(transcript) => {
          debug!("Parsed debate with {} turns", transcript.debate.len());
          transcript
        }
      , Err(e) => {
          warn!("Council debate unreadable: {}", e);
          DebateTranscript::fallback()
        }
    }
}

fn parse_debate(raw: &str) -> crate::Result<DebateTranscript>
{   let cleaned = strip_fences(raw);
    if let Ok(transcript)
      = serde_json::from_str::<DebateTranscript>(&cleaned)
    {   return Ok(transcript);
    }
    let (object, _) = locate_trailing_object(&cleaned)
      .ok_or_else(|| {
        crate::Error::Malformed("no JSON object found".to_string())
      })?;
    serde_json::from_value(Value::Object(object))
      .map_err(|e| crate::Error::Malformed(e.to_string()))
}

/// The JSON object closing `raw`, if there is one
pub fn extract_trailing_json(raw: &str) -> Option<Map<String, Value>>
{   locate_trailing_object(raw).map(|(object, _)| object)
}

/// Split a generated chapter into prose and state update.
///
/// The state block and its fence are cut out of the narrative.
/// With no readable block the whole text is the narrative.
pub fn parse_story(raw: &str) -> StoryTurn
{   let Some((object, range)) = locate_trailing_object(raw)
    else
    {   debug!("No state update in story text");
        return StoryTurn
        {   narrative: raw.trim().to_string()
          , state: None
        };
    };

    let before = trim_open_fence(&raw[..range.start]);
    let after = raw[range.end..].trim_start();
    let after = after.strip_prefix(FENCE).unwrap_or(after).trim();

    let narrative = if after.is_empty()
    {   before.to_string()
    } else if before.is_empty()
    {   after.to_string()
    } else
    {   format!("{}\n\n{}", before, after)
    };

    StoryTurn
    {   narrative
      , state: Some(StateUpdate::from_object(&object))
    }
}

/// Drop a fence opener (e.g. "```json") left dangling at the end
fn trim_open_fence(text: &str) -> &str
{   let trimmed = text.trim_end();
    match trimmed.rfind(FENCE)
    {   Some(pos) if trimmed[pos + FENCE.len()..]
          .chars()
          .all(is_tag_char) => trimmed[..pos].trim()
      , _ => trimmed.trim()
    }
}
