// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::Path;

use crate::sample::{PadId, Sample};

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Outputs a position in seconds with millisecond precision, or dashes if there is none.
pub fn format_position(position: Option<f64>) -> String {
    match position {
        Some(position) => format!("{:.3}s", position),
        None => "--".to_string(),
    }
}

/// Outputs the given pads as a space separated list of pad numbers.
pub fn format_pads(pads: &BTreeSet<PadId>) -> String {
    if pads.is_empty() {
        return "none".to_string();
    }
    pads.iter()
        .map(|pad| pad.0.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}

/// Outputs a table of the sample's chops.
pub fn chop_table(sample: &Sample) -> String {
    let mut table = format!(
        "{} ({}, {:.3}s, {} Hz)\n",
        sample.name(),
        sample.kind(),
        sample.duration(),
        sample.sample_rate()
    );
    let _ = writeln!(table, "{:>4} {:>9} {:>9} {:>9}", "chop", "start", "end", "length");
    for (index, chop) in sample.chops().iter().enumerate() {
        let _ = writeln!(
            table,
            "{:>4} {:>9.3} {:>9.3} {:>9.3}",
            index + 1,
            chop.start,
            chop.end,
            chop.duration()
        );
    }
    table
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;
    use std::path::Path;

    use crate::sample::{DecodedBuffer, PadId, Sample, SampleKind};
    use crate::util::{chop_table, filename_display, format_pads, format_position};

    #[test]
    fn test_filename_display() {
        assert_eq!("amen.wav", filename_display(Path::new("/breaks/amen.wav")));
        assert_eq!("unreadable file name", filename_display(Path::new("/")));
    }

    #[test]
    fn test_format_position() {
        assert_eq!("--", format_position(None));
        assert_eq!("0.000s", format_position(Some(0.0)));
        assert_eq!("1.250s", format_position(Some(1.25)));
    }

    #[test]
    fn test_format_pads() {
        assert_eq!("none", format_pads(&BTreeSet::new()));
        assert_eq!("0 9 15", format_pads(&BTreeSet::from([PadId(15), PadId(0), PadId(9)])));
    }

    #[test]
    fn test_chop_table() {
        let sample = Sample::from_chop_points(
            "amen.wav",
            SampleKind::Drums,
            DecodedBuffer::mono(vec![0.0; 2000], 1000),
            &[0.0, 0.5],
        );
        let table = chop_table(&sample);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!("amen.wav (drums, 2.000s, 1000 Hz)", lines[0]);
        assert_eq!("chop     start       end    length", lines[1]);
        assert_eq!("   1     0.000     0.500     0.500", lines[2]);
        assert_eq!("   2     0.500     2.000     1.500", lines[3]);
        assert_eq!(4, lines.len());
    }
}
