//! Structural chunking of contract text
//!
//! The chunker splits a document into typed, field-relevant slices. It is
//! deterministic and never calls out: the same input always yields the same
//! ids, boundaries and types, so every strategy can share one pass.

use concord_domain::{Chunk, ChunkType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Chunking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Share of an unstructured document treated as its header
    pub header_fraction: f64,

    /// Lines kept on each side of a keyword line in unstructured documents
    pub keyword_window_lines: usize,

    /// Sections longer than this (in characters) are split at line boundaries
    pub max_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            header_fraction: 0.3,
            keyword_window_lines: 2,
            max_chunk_chars: 4_000,
        }
    }
}

impl ChunkerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.header_fraction > 0.0 && self.header_fraction <= 1.0) {
            return Err("chunker.header_fraction must be in (0, 1]".to_string());
        }
        if self.max_chunk_chars == 0 {
            return Err("chunker.max_chunk_chars must be greater than 0".to_string());
        }
        Ok(())
    }
}

static SECTION_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\s*第[一二三四五六七八九十百零〇\d]+[条章节]",
        r"^\s*[一二三四五六七八九十]+、",
        r"^\s*\d{1,2}[.、．]\s*[^\d\s.]",
        r"^\s*\d{1,2}(\.\d{1,2})+[.、．]?\s+\S",
        r"^\s*[（(][一二三四五六七八九十]+[）)]",
        r"^\s*(?i:article)\s+\d+",
        r"^\s*#{1,6}\s",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

const HEADER_CUES: &[&str] = &["合同编号", "合同名称", "contract no"];
const PARTY_CUES: &[&str] = &["甲方", "乙方", "委托方", "受托方", "买方", "卖方", "party"];
const FINANCIAL_CUES: &[&str] = &[
    "金额", "价款", "付款", "支付", "税率", "总价", "费用", "price", "payment",
];
const SCHEDULE_CUES: &[&str] = &[
    "期限", "日期", "里程碑", "进度", "工期", "交付", "milestone", "term",
];
const SIGNATURE_CUES: &[&str] = &["签字", "盖章", "签章", "签署", "signature"];

/// Heading cue lists in classification order
const CUE_ORDER: &[(ChunkType, &[&str])] = &[
    (ChunkType::Header, HEADER_CUES),
    (ChunkType::Party, PARTY_CUES),
    (ChunkType::Financial, FINANCIAL_CUES),
    (ChunkType::Schedule, SCHEDULE_CUES),
    (ChunkType::Signature, SIGNATURE_CUES),
];

/// A line of the input with its byte span, terminator included
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

impl<'a> Line<'a> {
    fn content(&self) -> &'a str {
        self.text.trim_end_matches(['\n', '\r'])
    }
}

/// A typed byte range before it becomes a [`Chunk`]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: usize,
    end: usize,
    chunk_type: ChunkType,
}

/// Splits contract text into typed chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a chunker with the given settings
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Get the chunker settings
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk the given text
    ///
    /// Empty or whitespace-only text yields no chunks.
    ///
    /// # Examples
    ///
    /// ```
    /// use concord_domain::ChunkType;
    /// use concord_extractor::chunking::Chunker;
    ///
    /// let text = "合同编号：CT-001\n第一条 合同价款\n总价：100元\n";
    /// let chunks = Chunker::default().chunk(text);
    /// assert_eq!(chunks[0].chunk_type, ChunkType::Header);
    /// assert_eq!(chunks[1].chunk_type, ChunkType::Financial);
    /// assert!(Chunker::default().chunk("  \n").is_empty());
    /// ```
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let lines = split_lines(text);
        let markers: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_section_marker(line.content()))
            .map(|(i, _)| i)
            .collect();

        let spans = if !markers.is_empty() {
            self.sectioned(text, &lines, &markers)
        } else if let Some(spans) = self.windowed(text, &lines) {
            spans
        } else {
            vec![Span {
                start: 0,
                end: text.len(),
                chunk_type: ChunkType::Other,
            }]
        };

        spans
            .into_iter()
            .flat_map(|span| self.split_oversize(text, &lines, span))
            .enumerate()
            .map(|(i, span)| Chunk::new(i, text, span.start, span.end, span.chunk_type))
            .collect()
    }

    /// Sections between numbered markers, covering the whole text
    fn sectioned(&self, text: &str, lines: &[Line<'_>], markers: &[usize]) -> Vec<Span> {
        let mut spans = Vec::with_capacity(markers.len() + 1);
        let first_start = lines[markers[0]].start;
        let preamble_is_blank = text[..first_start].trim().is_empty();

        if first_start > 0 && !preamble_is_blank {
            spans.push(Span {
                start: 0,
                end: first_start,
                chunk_type: ChunkType::Header,
            });
        }

        for (n, &marker) in markers.iter().enumerate() {
            let start = if n == 0 && preamble_is_blank {
                0
            } else {
                lines[marker].start
            };
            let end = markers
                .get(n + 1)
                .map(|&next| lines[next].start)
                .unwrap_or(text.len());
            let next_line = markers.get(n + 1).copied().unwrap_or(lines.len());
            let heading = lines[marker].content();
            let body = &lines[marker + 1..next_line];
            spans.push(Span {
                start,
                end,
                chunk_type: classify_section(heading, body),
            });
        }
        spans
    }

    /// Header plus keyword windows for documents without section markers
    ///
    /// Returns `None` when the text carries no recognizable cue at all.
    fn windowed(&self, text: &str, lines: &[Line<'_>]) -> Option<Vec<Span>> {
        let has_cues = lines.iter().any(|line| {
            let lower = line.content().to_lowercase();
            count_cues(&lower, HEADER_CUES) > 0
                || count_cues(&lower, PARTY_CUES) > 0
                || keyword_type(&lower).is_some()
        });
        if !has_cues {
            return None;
        }

        let target = (text.len() as f64 * self.config.header_fraction) as usize;
        let header_lines = lines
            .iter()
            .position(|line| line.end >= target.max(1))
            .map(|i| i + 1)
            .unwrap_or(lines.len());
        let header_end = lines[header_lines - 1].end;

        let mut spans = vec![Span {
            start: 0,
            end: header_end,
            chunk_type: ChunkType::Header,
        }];

        let window = self.config.keyword_window_lines;
        for i in header_lines..lines.len() {
            let lower = lines[i].content().to_lowercase();
            let Some(chunk_type) = keyword_type(&lower) else {
                continue;
            };
            let first = i.saturating_sub(window).max(header_lines);
            let last = (i + window).min(lines.len() - 1);
            let mut start = lines[first].start;
            let end = lines[last].end;

            let previous = spans.len() - 1;
            let prev = spans[previous];
            if start <= prev.end && previous > 0 && prev.chunk_type == chunk_type {
                spans[previous].end = prev.end.max(end);
                continue;
            }
            start = start.max(prev.end);
            if start < end {
                spans.push(Span {
                    start,
                    end,
                    chunk_type,
                });
            }
        }
        Some(spans)
    }

    /// Split a span longer than `max_chunk_chars` at line boundaries
    fn split_oversize(&self, text: &str, lines: &[Line<'_>], span: Span) -> Vec<Span> {
        let max = self.config.max_chunk_chars;
        if text[span.start..span.end].chars().count() <= max {
            return vec![span];
        }

        let mut pieces = Vec::new();
        let mut piece_start = span.start;
        let mut piece_chars = 0;
        for line in lines
            .iter()
            .filter(|l| l.start >= span.start && l.end <= span.end)
        {
            let line_chars = line.text.chars().count();
            if piece_chars > 0 && piece_chars + line_chars > max {
                pieces.push(Span {
                    start: piece_start,
                    end: line.start,
                    chunk_type: span.chunk_type,
                });
                piece_start = line.start;
                piece_chars = 0;
            }
            piece_chars += line_chars;
        }
        if piece_start < span.end {
            pieces.push(Span {
                start: piece_start,
                end: span.end,
                chunk_type: span.chunk_type,
            });
        }
        pieces
    }
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|line| {
            let start = offset;
            offset += line.len();
            Line {
                start,
                end: offset,
                text: line,
            }
        })
        .collect()
}

fn is_section_marker(line: &str) -> bool {
    SECTION_MARKERS.iter().any(|re| re.is_match(line))
}

fn count_cues(lower: &str, cues: &[&str]) -> usize {
    cues.iter().map(|cue| lower.matches(cue).count()).sum()
}

/// Financial or schedule, whichever a line mentions more (financial on ties)
fn keyword_type(lower: &str) -> Option<ChunkType> {
    let financial = count_cues(lower, FINANCIAL_CUES);
    let schedule = count_cues(lower, SCHEDULE_CUES);
    match (financial, schedule) {
        (0, 0) => None,
        (f, s) if f >= s => Some(ChunkType::Financial),
        _ => Some(ChunkType::Schedule),
    }
}

/// Type a section by its heading first, then by the cue counts of its body
fn classify_section(heading: &str, body: &[Line<'_>]) -> ChunkType {
    let heading = heading.to_lowercase();
    if let Some((chunk_type, _)) = CUE_ORDER
        .iter()
        .find(|(_, cues)| count_cues(&heading, cues) > 0)
    {
        return *chunk_type;
    }

    let mut best = (ChunkType::Article, 0);
    for (chunk_type, cues) in CUE_ORDER {
        let hits: usize = body
            .iter()
            .map(|line| {
                let lower = line.content().trim_start().to_lowercase();
                if *chunk_type == ChunkType::Party {
                    usize::from(cues.iter().any(|cue| lower.starts_with(cue)))
                } else {
                    count_cues(&lower, cues)
                }
            })
            .sum();
        if hits > best.1 {
            best = (*chunk_type, hits);
        }
    }
    best.0
}

/// Keep the header chunk and every chunk relevant to one of `field_names`
pub fn chunks_for_fields<S: AsRef<str>>(chunks: &[Chunk], field_names: &[S]) -> Vec<Chunk> {
    chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkType::Header || c.is_relevant_to(field_names))
        .cloned()
        .collect()
}

/// Concatenate chunks in order into a context of at most `max_chars` characters
pub fn chunks_text(chunks: &[Chunk], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for chunk in chunks {
        if used >= max_chars {
            break;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
            used += 1;
        }
        let remaining = max_chars.saturating_sub(used);
        let taken: String = chunk.text.chars().take(remaining).collect();
        used += taken.chars().count();
        out.push_str(&taken);
    }
    out
}
