use chrono::{Days, NaiveDate, NaiveTime};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::LineParser;
use crate::dedup::dedup_key;
use crate::entry::{format_timestamp, normalize, Entry};

/// A track line before it is anchored to a date.
#[derive(Debug, Default, PartialEq)]
struct PlayedLine {
    time: Option<NaiveTime>,
    title: String,
    artist: String,
}

// VirtualDJ history line:
// #EXTVDJ:<time>21:14</time><lastplaytime>1698379140</lastplaytime><artist>Phish</artist><title>Tweezer</title>
static VDJ_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?P<tag>[A-Za-z]+)>(?P<value>[^<]*)</[A-Za-z]+>").unwrap()
});

// Plain extended M3U: #EXTINF:300,Phish - Tweezer
static EXTINF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#EXTINF:[^,]*,(?P<rest>.*)$").unwrap()
});

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<h>\d{1,2}):(?P<m>\d{2})").unwrap()
});

/// Minimal playlist line parser for VirtualDJ history exports.
///
/// Understands `#EXTVDJ:` lines (with `<time>`, `<artist>`, `<title>`) and
/// plain `#EXTINF:<secs>,Artist - Title` lines; everything else is ignored.
/// Times are anchored to the file's date; when the clock goes backwards the
/// set crossed midnight and the date advances a day.
#[derive(Debug, Default, Clone)]
pub struct M3uLineParser;

impl M3uLineParser {
    pub fn new() -> Self {
        Self
    }
}

impl LineParser for M3uLineParser {
    fn parse_entries(&self, lines: &[String], seen_keys: &HashSet<String>, file_date_hint: &str) -> Vec<Entry> {
        let base_date = NaiveDate::parse_from_str(file_date_hint, "%Y-%m-%d").ok();
        let mut day_offset = 0u64;
        let mut last_time: Option<NaiveTime> = None;
        let mut local_seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::new();

        for line in lines {
            let Some(played) = parse_line(line.trim()) else {
                continue;
            };
            if played.title.is_empty() && played.artist.is_empty() {
                continue;
            }

            if let (Some(time), Some(prev)) = (played.time, last_time) {
                if time < prev {
                    day_offset += 1;
                }
            }
            if played.time.is_some() {
                last_time = played.time;
            }

            let timestamp = match base_date.and_then(|d| d.checked_add_days(Days::new(day_offset))) {
                Some(date) => format_timestamp(&date.and_time(played.time.unwrap_or_default())),
                // Not a dated file name: keep the hint, the timestamp won't
                // parse and the entry sorts as oldest.
                None => match played.time {
                    Some(time) => format!("{file_date_hint} {}", time.format("%H:%M")),
                    None => file_date_hint.to_string(),
                },
            };

            let entry = Entry::new(timestamp, played.title, played.artist);
            let key = dedup_key(&entry);
            if seen_keys.contains(&key) || !local_seen.insert(key) {
                continue;
            }
            entries.push(entry);
        }

        log::debug!("Parsed {} entries for {file_date_hint}", entries.len());
        entries
    }
}

fn parse_line(line: &str) -> Option<PlayedLine> {
    if let Some(tags) = line.strip_prefix("#EXTVDJ:") {
        let mut played = PlayedLine::default();
        for caps in VDJ_TAG_RE.captures_iter(tags) {
            let value = unescape(&caps["value"]);
            match caps["tag"].to_ascii_lowercase().as_str() {
                "time" => played.time = parse_clock(&value),
                "title" => played.title = normalize(Some(value.as_str())),
                "artist" => played.artist = normalize(Some(value.as_str())),
                _ => {}
            }
        }
        return Some(played);
    }

    let caps = EXTINF_RE.captures(line)?;
    let rest = caps["rest"].trim();
    let (artist, title) = match rest.split_once(" - ") {
        Some((artist, title)) => (artist, title),
        None => ("", rest),
    };
    Some(PlayedLine {
        time: None,
        title: normalize(Some(title)),
        artist: normalize(Some(artist)),
    })
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    let caps = CLOCK_RE.captures(value.trim())?;
    let h: u32 = caps["h"].parse().ok()?;
    let m: u32 = caps["m"].parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

/// Undo the XML escaping VirtualDJ applies to tag values.
fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
