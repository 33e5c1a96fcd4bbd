//! Human-readable rendering of job state for terminal output.

use acquire_core::job::{JobStatus, JobSummary};

pub fn bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{v:.1} {}", UNITS[unit])
    }
}

pub fn duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// One line per tick while a job runs.
pub fn progress_line(st: &JobStatus) -> String {
    let mut line = format!(
        "  [{}] {:<11} {} / {} ({:.1}%)",
        st.id,
        st.state.as_str(),
        bytes(st.downloaded_bytes),
        bytes(st.total_bytes),
        st.progress_percent
    );
    if st.speed_bps > 0.0 {
        line.push_str(&format!("  {}/s", bytes(st.speed_bps as u64)));
    }
    if let Some(eta) = st.eta_seconds {
        line.push_str(&format!("  ETA {}", duration(eta)));
    }
    if let Some(p) = st.staging {
        line.push_str(&format!("  entries {}/{}", p.entries_done, p.entries_total));
    }
    line
}

/// Multi-line block for `acquire status`.
pub fn status_block(st: &JobStatus) -> String {
    let mut out = format!(
        "job {}\n  state:      {}\n  progress:   {:.1}% ({} / {})\n",
        st.id,
        st.state,
        st.progress_percent,
        bytes(st.downloaded_bytes),
        bytes(st.total_bytes)
    );
    if st.speed_bps > 0.0 {
        out.push_str(&format!("  speed:      {}/s\n", bytes(st.speed_bps as u64)));
    }
    if let Some(eta) = st.eta_seconds {
        out.push_str(&format!("  eta:        {}\n", duration(eta)));
    }
    out.push_str(&format!("  checksum:   {}", st.checksum_state.as_str()));
    if let Some(v) = &st.checksum_value {
        out.push_str(&format!(" {v}"));
    }
    out.push('\n');
    if let Some(p) = st.staging {
        out.push_str(&format!(
            "  staging:    {}/{} entries\n",
            p.entries_done, p.entries_total
        ));
    }
    if let Some((cause, detail)) = &st.failure {
        out.push_str(&format!("  failure:    {cause}: {detail}\n"));
    }
    out
}

pub fn summary_header() -> String {
    format!(
        "{:<6} {:<11} {:>7} {:>10}  {}",
        "ID", "STATE", "DONE", "SIZE", "NAME"
    )
}

pub fn summary_row(j: &JobSummary) -> String {
    let mut row = format!(
        "{:<6} {:<11} {:>6.1}% {:>10}  {}",
        j.id,
        j.state.as_str(),
        j.progress_percent(),
        bytes(j.total_size),
        j.filename
    );
    if let Some(cause) = j.failure {
        row.push_str(&format!("  ({cause})"));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_units() {
        assert_eq!(bytes(512), "512 B");
        assert_eq!(bytes(1536), "1.5 KiB");
        assert_eq!(bytes(76 * 1024 * 1024 * 1024), "76.0 GiB");
    }

    #[test]
    fn durations() {
        assert_eq!(duration(9), "9s");
        assert_eq!(duration(125), "2m05s");
        assert_eq!(duration(3 * 3600 + 7 * 60), "3h07m");
    }
}
