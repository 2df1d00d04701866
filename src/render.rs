//! Table and JSON output for one sampling cycle.

use crate::config::OutputFormat;
use crate::data::{GpuReading, SamplingCycle};
use crossterm::cursor::{MoveDown, MoveUp};
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::Command;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::io::{self, Write};

const SEPARATOR: &str = "\u{2502}";

// Leading blank line plus the column header
const HEADER_ROWS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Low,
    Mid,
    High,
}

impl Tier {
    fn color(self) -> Color {
        match self {
            Tier::Low => Color::DarkGreen,
            Tier::Mid => Color::DarkYellow,
            Tier::High => Color::DarkRed,
        }
    }
}

/// Warn/danger pair. A value equal to a threshold belongs to the higher tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub warn: u32,
    pub danger: u32,
}

impl Thresholds {
    pub const fn tier(&self, temperature: u32) -> Tier {
        if temperature >= self.danger {
            Tier::High
        } else if temperature >= self.warn {
            Tier::Mid
        } else {
            Tier::Low
        }
    }
}

pub const CORE_THRESHOLDS: Thresholds = Thresholds { warn: 70, danger: 85 };
pub const JUNCTION_THRESHOLDS: Thresholds = Thresholds { warn: 80, danger: 95 };
pub const VRAM_THRESHOLDS: Thresholds = Thresholds { warn: 80, danger: 95 };

/// Redrawing table. Each frame overwrites the previous one in place.
#[derive(Debug, Default)]
pub struct TableRenderer {
    blink: bool,
    last_rows: Option<usize>,
}

impl TableRenderer {
    pub fn frame(&mut self, cycle: &SamplingCycle) -> Result<String, fmt::Error> {
        self.blink = !self.blink;
        let marker = if self.blink { "  " } else { "* " };

        let mut frame = String::new();
        write!(
            frame,
            "\n{marker}{SEPARATOR}  CORE  {SEPARATOR}  JUNC  {SEPARATOR}  VRAM  {SEPARATOR}\n"
        )?;
        for reading in cycle.readings() {
            write_row(&mut frame, reading)?;
        }

        let rows = cycle.len() + HEADER_ROWS;
        MoveUp(clamp_rows(rows)).write_ansi(&mut frame)?;
        self.last_rows = Some(rows);
        Ok(frame)
    }

    /// Cursor motion that leaves the terminal below the last frame.
    pub fn trailer(&self) -> Result<String, fmt::Error> {
        let mut trailer = String::new();
        if let Some(rows) = self.last_rows {
            MoveDown(clamp_rows(rows)).write_ansi(&mut trailer)?;
            trailer.push('\n');
        }
        Ok(trailer)
    }
}

fn clamp_rows(rows: usize) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX)
}

fn write_temperature(out: &mut String, temperature: u32, thresholds: Thresholds) -> fmt::Result {
    SetForegroundColor(thresholds.tier(temperature).color()).write_ansi(out)?;
    write!(out, "{temperature:3}\u{b0}C")?;
    ResetColor.write_ansi(out)
}

fn write_row(out: &mut String, reading: &GpuReading) -> fmt::Result {
    write!(out, "{} {SEPARATOR} ", reading.index)?;
    write_temperature(out, reading.core, CORE_THRESHOLDS)?;
    write!(out, "  {SEPARATOR} ")?;
    write_temperature(out, reading.junction, JUNCTION_THRESHOLDS)?;
    write!(out, "  {SEPARATOR} ")?;
    write_temperature(out, reading.vram, VRAM_THRESHOLDS)?;
    writeln!(out, "  {SEPARATOR}")
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: i64,
    gpus: &'a [GpuReading],
}

/// One self-contained, newline-terminated JSON line per cycle.
pub fn json_record(cycle: &SamplingCycle, timestamp: i64) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(&JsonRecord {
        timestamp,
        gpus: cycle.readings(),
    })?;
    line.push('\n');
    Ok(line)
}

pub enum Renderer {
    Table(TableRenderer),
    Json,
}

impl Renderer {
    pub fn new(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Table => Renderer::Table(TableRenderer::default()),
            OutputFormat::Json => Renderer::Json,
        }
    }

    pub fn render<W: Write>(
        &mut self,
        cycle: &SamplingCycle,
        timestamp: i64,
        out: &mut W,
    ) -> io::Result<()> {
        let text = match self {
            Renderer::Table(table) => table.frame(cycle).map_err(format_error)?,
            Renderer::Json => json_record(cycle, timestamp)?,
        };
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    pub fn finish<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if let Renderer::Table(table) = self {
            out.write_all(table.trailer().map_err(format_error)?.as_bytes())?;
            out.flush()?;
        }
        Ok(())
    }
}

fn format_error(_: fmt::Error) -> io::Error {
    io::Error::other("failed to format table frame")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ansi(command: impl Command) -> String {
        let mut text = String::new();
        command.write_ansi(&mut text).unwrap();
        text
    }

    fn cycle(readings: &[(u32, u32, u32)]) -> SamplingCycle {
        SamplingCycle::new(
            readings
                .iter()
                .enumerate()
                .map(|(index, &(core, junction, vram))| GpuReading {
                    index: index as u32,
                    core,
                    junction,
                    vram,
                })
                .collect(),
        )
    }

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        for thresholds in [CORE_THRESHOLDS, JUNCTION_THRESHOLDS, VRAM_THRESHOLDS] {
            assert_eq!(thresholds.tier(0), Tier::Low);
            assert_eq!(thresholds.tier(thresholds.warn - 1), Tier::Low);
            assert_eq!(thresholds.tier(thresholds.warn), Tier::Mid);
            assert_eq!(thresholds.tier(thresholds.danger - 1), Tier::Mid);
            assert_eq!(thresholds.tier(thresholds.danger), Tier::High);
            assert_eq!(thresholds.tier(150), Tier::High);
        }
    }

    #[test]
    fn test_threshold_values() {
        assert_eq!(CORE_THRESHOLDS.tier(69), Tier::Low);
        assert_eq!(CORE_THRESHOLDS.tier(70), Tier::Mid);
        assert_eq!(CORE_THRESHOLDS.tier(85), Tier::High);
        assert_eq!(JUNCTION_THRESHOLDS.tier(79), Tier::Low);
        assert_eq!(JUNCTION_THRESHOLDS.tier(80), Tier::Mid);
        assert_eq!(VRAM_THRESHOLDS.tier(94), Tier::Mid);
        assert_eq!(VRAM_THRESHOLDS.tier(95), Tier::High);
    }

    #[test]
    fn test_json_two_gpus() {
        let line = json_record(&cycle(&[(55, 60, 50), (91, 97, 90)]), 1_700_000_000).unwrap();
        assert_eq!(
            line,
            "{\"timestamp\":1700000000,\"gpus\":[{\"index\":0,\"core\":55,\"junction\":60,\"vram\":50},{\"index\":1,\"core\":91,\"junction\":97,\"vram\":90}]}\n"
        );
    }

    #[test]
    fn test_table_frame_layout() {
        let mut table = TableRenderer::default();
        let frame = table.frame(&cycle(&[(55, 60, 50), (91, 97, 90)])).unwrap();

        let header = format!("\n  {SEPARATOR}  CORE  {SEPARATOR}  JUNC  {SEPARATOR}  VRAM  {SEPARATOR}\n");
        assert!(frame.starts_with(&header));

        let green = ansi(SetForegroundColor(Color::DarkGreen));
        let red = ansi(SetForegroundColor(Color::DarkRed));
        let reset = ansi(ResetColor);
        let first_row = format!(
            "0 {SEPARATOR} {green} 55\u{b0}C{reset}  {SEPARATOR} {green} 60\u{b0}C{reset}  {SEPARATOR} {green} 50\u{b0}C{reset}  {SEPARATOR}\n"
        );
        let yellow = ansi(SetForegroundColor(Color::DarkYellow));
        let second_row = format!(
            "1 {SEPARATOR} {red} 91\u{b0}C{reset}  {SEPARATOR} {red} 97\u{b0}C{reset}  {SEPARATOR} {yellow} 90\u{b0}C{reset}  {SEPARATOR}\n"
        );
        assert!(frame.contains(&first_row));
        assert!(frame.contains(&second_row));
        assert!(frame.ends_with(&ansi(MoveUp(4))));
    }

    #[test]
    fn test_marker_alternates_between_frames() {
        let mut table = TableRenderer::default();
        let readings = cycle(&[(40, 45, 40)]);
        let first = table.frame(&readings).unwrap();
        let second = table.frame(&readings).unwrap();
        let third = table.frame(&readings).unwrap();
        assert!(first.starts_with("\n  "));
        assert!(second.starts_with("\n* "));
        assert!(third.starts_with("\n  "));
    }

    #[test]
    fn test_large_frames_are_not_truncated() {
        let mut table = TableRenderer::default();
        let many: Vec<_> = (0..64).map(|i| (40 + i % 50, 50, 60)).collect();
        let frame = table.frame(&cycle(&many)).unwrap();
        assert!(frame.contains("63 "));
        assert!(frame.ends_with(&ansi(MoveUp(66))));
    }

    #[test]
    fn test_trailer_moves_below_last_frame() {
        let mut table = TableRenderer::default();
        assert_eq!(table.trailer().unwrap(), "");
        table.frame(&cycle(&[(40, 45, 40)])).unwrap();
        assert_eq!(table.trailer().unwrap(), ansi(MoveDown(3)) + "\n");
    }

    #[test]
    fn test_renderer_writes_json_lines() {
        let mut renderer = Renderer::new(OutputFormat::Json);
        let mut out = Vec::new();
        let readings = cycle(&[(30, 31, 32)]);
        renderer.render(&readings, 1, &mut out).unwrap();
        renderer.render(&readings, 2, &mut out).unwrap();
        renderer.finish(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("{\"timestamp\":2,"));
    }
}
