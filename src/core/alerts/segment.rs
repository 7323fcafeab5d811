// Splits alert text into transport-sized segments.
//
// Budgets follow SMS concatenation: GSM 03.38 text gets 160 units in a single
// segment and 153 per part, anything else is sent as UCS-2 with 70/67 UTF-16
// units. Splits land on char boundaries only.

use serde::{Deserialize, Serialize};

const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// Characters from the GSM extension table, sent as escape + char.
const GSM7_EXTENDED: &str = "^{}\\[~]|€\u{000C}";

/// Unit budgets per segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentLimits {
    pub gsm_single: usize,
    pub gsm_multipart: usize,
    pub ucs2_single: usize,
    pub ucs2_multipart: usize,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self {
            gsm_single: 160,
            gsm_multipart: 153,
            ucs2_single: 70,
            ucs2_multipart: 67,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gsm7,
    Ucs2,
}

impl Encoding {
    pub fn detect(text: &str) -> Self {
        if text.chars().all(|c| gsm7_units(c).is_some()) {
            Self::Gsm7
        } else {
            Self::Ucs2
        }
    }

    fn units(&self, c: char) -> usize {
        match self {
            Self::Gsm7 => gsm7_units(c).unwrap_or(1),
            Self::Ucs2 => c.len_utf16(),
        }
    }
}

fn gsm7_units(c: char) -> Option<usize> {
    if GSM7_BASIC.contains(c) {
        Some(1)
    } else if GSM7_EXTENDED.contains(c) {
        Some(2)
    } else {
        None
    }
}

/// Split `text` into ordered segments whose concatenation is exactly `text`.
pub fn split_segments(text: &str, limits: &SegmentLimits) -> Vec<String> {
    let encoding = Encoding::detect(text);
    let (single, multipart) = match encoding {
        Encoding::Gsm7 => (limits.gsm_single, limits.gsm_multipart),
        Encoding::Ucs2 => (limits.ucs2_single, limits.ucs2_multipart),
    };

    let total: usize = text.chars().map(|c| encoding.units(c)).sum();
    if total <= single {
        return vec![text.to_string()];
    }

    // A budget below 2 could never fit a surrogate pair or an escaped char.
    let budget = multipart.max(2);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut used = 0;

    for c in text.chars() {
        let units = encoding.units(c);
        if used + units > budget && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += units;
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments
}
