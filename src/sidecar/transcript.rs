//! Word-level transcript sidecar (`transcript_words.json`).

use crate::foundation::core::{TICKS_PER_SECOND, Tick};
use crate::foundation::error::{MetavisError, MvResult};
use crate::sidecar::captions::Cue;

/// Current transcript schema version.
pub const TRANSCRIPT_SCHEMA_VERSION: u32 = 1;

/// One transcribed word with timeline and source timings in ticks.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptWord {
    /// The word text.
    pub text: String,
    /// Timeline start in ticks.
    pub timeline_start_ticks: i64,
    /// Timeline end in ticks.
    pub timeline_end_ticks: i64,
    /// Source start in ticks.
    pub source_start_ticks: i64,
    /// Source end in ticks.
    pub source_end_ticks: i64,
    /// Speaker, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// The transcript document.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    /// Schema version; currently [`TRANSCRIPT_SCHEMA_VERSION`].
    pub schema_version: u32,
    /// Ticks per second; always 60000.
    pub tick_scale: i64,
    /// Words, monotonic non-decreasing in `timeline_start_ticks`.
    pub words: Vec<TranscriptWord>,
}

/// Milliseconds to ticks (exact).
fn ms_to_ticks(ms: u64) -> i64 {
    ms as i64 * (TICKS_PER_SECOND / 1000)
}

/// Build a transcript from caption cues.
///
/// Word times are distributed linearly across each cue window; the timeline
/// position is the cue time shifted by `timeline_offset` (the start of the
/// clip the captions belong to, minus its source offset).
pub fn transcript_from_cues(cues: &[Cue], timeline_offset: Tick) -> MvResult<Transcript> {
    let mut words = Vec::new();
    for cue in cues {
        if cue.end_ms < cue.start_ms {
            return Err(MetavisError::asset(format!(
                "cue at {}ms ends before it starts",
                cue.start_ms
            )));
        }
        let tokens: Vec<&str> = cue.text.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let start = ms_to_ticks(cue.start_ms);
        let end = ms_to_ticks(cue.end_ms);
        let span = end - start;
        let n = tokens.len() as i64;
        for (i, token) in tokens.iter().enumerate() {
            let w_start = start + span * i as i64 / n;
            let w_end = start + span * (i as i64 + 1) / n;
            words.push(TranscriptWord {
                text: (*token).to_owned(),
                timeline_start_ticks: w_start + timeline_offset.0,
                timeline_end_ticks: w_end + timeline_offset.0,
                source_start_ticks: w_start,
                source_end_ticks: w_end,
                speaker: cue.speaker.clone(),
            });
        }
    }

    for pair in words.windows(2) {
        if pair[1].timeline_start_ticks < pair[0].timeline_start_ticks {
            return Err(MetavisError::asset(
                "transcript words are not monotonic in timeline start",
            ));
        }
    }

    Ok(Transcript {
        schema_version: TRANSCRIPT_SCHEMA_VERSION,
        tick_scale: TICKS_PER_SECOND,
        words,
    })
}

/// Serialize with stable key ordering.
pub fn to_json(transcript: &Transcript) -> MvResult<String> {
    serde_json::to_string_pretty(transcript)
        .map_err(|e| MetavisError::io(format!("transcript serialization failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start_ms: u64, end_ms: u64, text: &str, speaker: Option<&str>) -> Cue {
        Cue {
            start_ms,
            end_ms,
            text: text.to_owned(),
            speaker: speaker.map(str::to_owned),
        }
    }

    #[test]
    fn words_cover_the_cue_window_in_order() {
        let t = transcript_from_cues(
            &[cue(1000, 2000, "one two three", Some("Ada"))],
            Tick::ZERO,
        )
        .unwrap();
        assert_eq!(t.words.len(), 3);
        assert_eq!(t.words[0].timeline_start_ticks, 60_000);
        assert_eq!(t.words[2].timeline_end_ticks, 120_000);
        assert!(t.words.iter().all(|w| w.speaker.as_deref() == Some("Ada")));
        // Adjacent words butt against each other.
        assert_eq!(t.words[0].timeline_end_ticks, t.words[1].timeline_start_ticks);
    }

    #[test]
    fn timeline_offset_shifts_only_timeline_times() {
        let t = transcript_from_cues(&[cue(0, 1000, "hi", None)], Tick::from_secs(5)).unwrap();
        assert_eq!(t.words[0].timeline_start_ticks, 300_000);
        assert_eq!(t.words[0].source_start_ticks, 0);
    }

    #[test]
    fn schema_constants_are_fixed() {
        let t = transcript_from_cues(&[], Tick::ZERO).unwrap();
        assert_eq!(t.schema_version, 1);
        assert_eq!(t.tick_scale, 60_000);
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let t = transcript_from_cues(&[cue(0, 500, "word", None)], Tick::ZERO).unwrap();
        let json = to_json(&t).unwrap();
        assert!(json.contains("\"tickScale\": 60000"));
        assert!(json.contains("\"timelineStartTicks\""));
        assert!(!json.contains("speaker"));
    }
}
