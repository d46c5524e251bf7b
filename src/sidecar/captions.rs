//! Caption parsing and conversion (SRT <-> WebVTT).
//!
//! Round trips preserve cue ordering, start/end times at millisecond
//! precision, text, and the speaker tag (`[Name]` prefix in SRT, `<v Name>`
//! in WebVTT).

use crate::foundation::error::{MetavisError, MvResult};

/// One caption cue.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cue {
    /// Start time in milliseconds.
    pub start_ms: u64,
    /// End time in milliseconds.
    pub end_ms: u64,
    /// Cue text; embedded newlines preserved.
    pub text: String,
    /// Speaker name, when tagged.
    pub speaker: Option<String>,
}

/// Caption file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptionFormat {
    /// SubRip.
    Srt,
    /// WebVTT.
    Vtt,
}

/// Sniff the format and parse.
pub fn parse_auto(input: &str) -> MvResult<Vec<Cue>> {
    if input.trim_start().starts_with("WEBVTT") {
        parse_vtt(input)
    } else {
        parse_srt(input)
    }
}

/// Parse SubRip text into cues.
pub fn parse_srt(input: &str) -> MvResult<Vec<Cue>> {
    let mut cues = Vec::new();
    for block in split_blocks(input) {
        let mut lines = block.iter();
        let first = lines.next().expect("blocks are non-empty");
        // The numeric counter line is optional in the wild.
        let timing = if first.contains("-->") {
            first
        } else {
            lines
                .next()
                .ok_or_else(|| MetavisError::asset(format!("srt cue '{first}' has no timing line")))?
        };
        let (start_ms, end_ms) = parse_timing(timing)?;
        let raw_text = lines.cloned().collect::<Vec<&str>>().join("\n");
        let (speaker, text) = split_srt_speaker(&raw_text);
        cues.push(Cue {
            start_ms,
            end_ms,
            text,
            speaker,
        });
    }
    Ok(cues)
}

/// Parse WebVTT text into cues. Header metadata and cue identifiers are
/// skipped; NOTE blocks are ignored.
pub fn parse_vtt(input: &str) -> MvResult<Vec<Cue>> {
    let stripped = input.trim_start_matches('\u{feff}');
    if !stripped.trim_start().starts_with("WEBVTT") {
        return Err(MetavisError::asset("missing WEBVTT header"));
    }
    let body = match stripped.split_once("\n\n") {
        Some((_, rest)) => rest,
        None => "",
    };

    let mut cues = Vec::new();
    for block in split_blocks(body) {
        if block.first().is_some_and(|l| l.starts_with("NOTE")) {
            continue;
        }
        let mut lines = block.iter();
        let first = lines.next().expect("blocks are non-empty");
        let timing = if first.contains("-->") {
            first
        } else {
            // Cue identifier line.
            match lines.next() {
                Some(l) if l.contains("-->") => l,
                _ => continue,
            }
        };
        let (start_ms, end_ms) = parse_timing(timing)?;
        let raw_text = lines.cloned().collect::<Vec<&str>>().join("\n");
        let (speaker, text) = split_vtt_speaker(&raw_text);
        cues.push(Cue {
            start_ms,
            end_ms,
            text,
            speaker,
        });
    }
    Ok(cues)
}

/// Render cues as SubRip.
pub fn write_srt(cues: &[Cue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n",
            i + 1,
            format_ms(cue.start_ms, ','),
            format_ms(cue.end_ms, ',')
        ));
        match &cue.speaker {
            Some(name) => out.push_str(&format!("[{name}] {}\n", cue.text)),
            None => {
                out.push_str(&cue.text);
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

/// Render cues as WebVTT.
pub fn write_vtt(cues: &[Cue]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in cues {
        out.push_str(&format!(
            "{} --> {}\n",
            format_ms(cue.start_ms, '.'),
            format_ms(cue.end_ms, '.')
        ));
        match &cue.speaker {
            Some(name) => out.push_str(&format!("<v {name}>{}\n", cue.text)),
            None => {
                out.push_str(&cue.text);
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

/// Render cues in `format`.
pub fn write_captions(cues: &[Cue], format: CaptionFormat) -> String {
    match format {
        CaptionFormat::Srt => write_srt(cues),
        CaptionFormat::Vtt => write_vtt(cues),
    }
}

fn split_blocks(input: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in input.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.trim_end_matches('\r'));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_timing(line: &str) -> MvResult<(u64, u64)> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| MetavisError::asset(format!("bad caption timing line '{line}'")))?;
    // VTT allows cue settings after the end time.
    let end = rest.trim().split_whitespace().next().unwrap_or("");
    Ok((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

fn parse_timestamp(ts: &str) -> MvResult<u64> {
    let ts = ts.replace(',', ".");
    let parts: Vec<&str> = ts.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (Some(*h), *m, *s),
        [m, s] => (None, *m, *s),
        _ => return Err(MetavisError::asset(format!("bad caption timestamp '{ts}'"))),
    };
    let (secs, millis) = match s.split_once('.') {
        Some((sec, ms)) => {
            let mut ms = ms.to_owned();
            while ms.len() < 3 {
                ms.push('0');
            }
            (sec.to_owned(), ms[..3].to_owned())
        }
        None => (s.to_owned(), "000".to_owned()),
    };
    let parse = |v: &str| -> MvResult<u64> {
        v.parse()
            .map_err(|_| MetavisError::asset(format!("bad caption timestamp '{ts}'")))
    };
    let hours = match h {
        Some(h) => parse(h)?,
        None => 0,
    };
    Ok(((hours * 60 + parse(m)?) * 60 + parse(&secs)?) * 1000 + parse(&millis)?)
}

fn format_ms(ms: u64, sep: char) -> String {
    let h = ms / 3_600_000;
    let m = (ms / 60_000) % 60;
    let s = (ms / 1000) % 60;
    let frac = ms % 1000;
    format!("{h:02}:{m:02}:{s:02}{sep}{frac:03}")
}

fn split_srt_speaker(text: &str) -> (Option<String>, String) {
    if let Some(rest) = text.strip_prefix('[')
        && let Some((name, body)) = rest.split_once(']')
        && !name.is_empty()
    {
        return (Some(name.to_owned()), body.trim_start().to_owned());
    }
    (None, text.to_owned())
}

fn split_vtt_speaker(text: &str) -> (Option<String>, String) {
    if let Some(rest) = text.strip_prefix("<v ")
        && let Some((name, body)) = rest.split_once('>')
        && !name.is_empty()
    {
        let body = body.strip_suffix("</v>").unwrap_or(body);
        return (Some(name.to_owned()), body.to_owned());
    }
    (None, text.to_owned())
}
