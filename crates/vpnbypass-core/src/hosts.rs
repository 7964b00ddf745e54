// ── Hosts file managed block ──
//
// The engine owns one delimited section of the hosts file. Everything
// outside the markers is kept byte for byte.

use std::net::Ipv4Addr;

use indexmap::IndexMap;
use vpnbypass_helper::HostsEntry;

pub const MARKER_START: &str = "# >>> vpnbypass START >>>";
pub const MARKER_END: &str = "# <<< vpnbypass END <<<";

/// Entries for the managed block, sorted by domain.
pub fn entries_from_cache(cache: &IndexMap<String, Ipv4Addr>) -> Vec<HostsEntry> {
    let mut entries: Vec<HostsEntry> = cache
        .iter()
        .map(|(domain, ip)| HostsEntry {
            domain: domain.clone(),
            ip: *ip,
        })
        .collect();
    entries.sort_by(|a, b| a.domain.cmp(&b.domain));
    entries
}

/// The managed block including markers, or an empty string for no
/// entries.
pub fn render_managed_block(entries: &[HostsEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut block = String::with_capacity(64 + entries.len() * 32);
    block.push_str(MARKER_START);
    block.push('\n');
    for entry in entries {
        block.push_str(&format!("{} {}\n", entry.ip, entry.domain));
    }
    block.push_str(MARKER_END);
    block.push('\n');
    block
}

/// Byte range of the line whose trimmed content equals `marker`,
/// searching from `from`. The range includes the line's newline.
fn find_marker_line(text: &str, marker: &str, from: usize) -> Option<(usize, usize)> {
    let mut pos = from;
    for line in text[from..].split_inclusive('\n') {
        let start = pos;
        pos += line.len();
        if line.trim() == marker {
            return Some((start, pos));
        }
    }
    None
}

/// Replace the managed block in `existing` with `entries`.
///
/// The new block goes where the old one was, or is appended. An opening
/// marker without a closing one is treated as a block running to the end
/// of the file.
pub fn splice_hosts(existing: &str, entries: &[HostsEntry]) -> String {
    let block = render_managed_block(entries);

    let Some((start, after_start)) = find_marker_line(existing, MARKER_START, 0) else {
        if block.is_empty() {
            return existing.to_owned();
        }
        let mut out = existing.to_owned();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&block);
        return out;
    };

    let tail = find_marker_line(existing, MARKER_END, after_start)
        .map_or("", |(_, after_end)| &existing[after_end..]);

    let mut out = String::with_capacity(existing.len() + block.len());
    out.push_str(&existing[..start]);
    out.push_str(&block);
    out.push_str(tail);
    out
}

/// `existing` without the managed block.
pub fn strip_managed_block(existing: &str) -> String {
    splice_hosts(existing, &[])
}
