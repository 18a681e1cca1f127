use crate::render::{
    DrawCommand, DrawSurface, Rgb, BACKGROUND, GRID, HIT, MISS, NEUTRAL, PLAYHEAD, TARGET,
};
use std::io::{self, Write};

/// Terminal surface: rasterises draw commands into a character grid and
/// repaints the screen.
///
/// Reports the logical canvas size to the renderer and scales down to
/// `cols × rows` cells. Only every `skip`-th frame is painted.
pub struct ConsoleDisplay {
    canvas: (f32, f32),
    cols: usize,
    rows: usize,
    skip: u64,
    count: u64,
}

impl ConsoleDisplay {
    pub fn new(canvas_width: f32, canvas_height: f32, renderer_fps: u32, update_hz: u32) -> Self {
        let skip = if update_hz == 0 {
            1
        } else {
            (renderer_fps / update_hz).max(1) as u64
        };
        Self {
            canvas: (canvas_width, canvas_height),
            cols: 72,
            rows: 18,
            skip,
            count: 0,
        }
    }
}

impl DrawSurface for ConsoleDisplay {
    fn size(&self) -> Option<(f32, f32)> {
        Some(self.canvas)
    }

    fn draw(&mut self, commands: &[DrawCommand]) {
        self.count += 1;
        if self.count % self.skip != 0 {
            return;
        }

        let grid = rasterize(commands, self.canvas, self.cols, self.rows);
        let readout = commands.iter().find_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        });

        let mut out = String::new();
        // Clear screen and move cursor home
        out.push_str("\x1b[2J\x1b[H");
        out.push_str(&format!("╔{}╗\n", "═".repeat(self.cols)));
        out.push_str(&format!("║ {:<w$}║\n", "VOICE TRACE — Live Pitch", w = self.cols - 1));
        out.push_str(&format!("╠{}╣\n", "═".repeat(self.cols)));
        for row in &grid {
            out.push('║');
            out.extend(row.iter());
            out.push_str("║\n");
        }
        out.push_str(&format!("╠{}╣\n", "═".repeat(self.cols)));
        out.push_str(&format!(
            "║ {:<w$}║\n",
            readout.unwrap_or("---"),
            w = self.cols - 1
        ));
        out.push_str(&format!("╚{}╝\n", "═".repeat(self.cols)));

        let mut stdout = io::stdout();
        let _ = stdout.write_all(out.as_bytes());
        let _ = stdout.flush();
    }
}

fn glyph(color: Rgb) -> char {
    match color {
        GRID => '·',
        TARGET => '▬',
        PLAYHEAD => '│',
        HIT => '●',
        MISS => '×',
        NEUTRAL => '∘',
        _ => ' ',
    }
}

/// Rasterise commands onto a `cols × rows` grid. Text is left to the caller.
pub fn rasterize(
    commands: &[DrawCommand],
    canvas: (f32, f32),
    cols: usize,
    rows: usize,
) -> Vec<Vec<char>> {
    let mut grid = vec![vec![' '; cols]; rows];
    if cols == 0 || rows == 0 || canvas.0 <= 0.0 || canvas.1 <= 0.0 {
        return grid;
    }
    let sx = cols as f32 / canvas.0;
    let sy = rows as f32 / canvas.1;
    let to_cell = |x: f32, y: f32| ((x * sx).floor() as i64, (y * sy).floor() as i64);
    let mut plot = |c: i64, r: i64, ch: char| {
        // The bottom edge belongs to the last row
        let r = r.min(rows as i64 - 1);
        if c >= 0 && r >= 0 && (c as usize) < cols {
            grid[r as usize][c as usize] = ch;
        }
    };

    for cmd in commands {
        match cmd {
            DrawCommand::FillRect {
                x,
                y,
                width,
                height,
                color,
            } => {
                if *color == BACKGROUND {
                    continue;
                }
                let ch = glyph(*color);
                let c0 = (x * sx).round() as i64;
                let c1 = ((x + width) * sx).round() as i64;
                let r = ((y + height / 2.0) * sy).floor() as i64;
                for c in c0..c1.min(cols as i64) {
                    plot(c, r.max(0), ch);
                }
            }
            DrawCommand::Line {
                x1,
                y1,
                x2,
                y2,
                color,
                ..
            } => {
                let ch = glyph(*color);
                let (c1, r1) = to_cell(*x1, *y1);
                let (c2, r2) = to_cell(*x2, *y2);
                let steps = (c2 - c1).abs().max((r2 - r1).abs()).max(1);
                for i in 0..=steps {
                    let t = i as f64 / steps as f64;
                    let c = c1 + ((c2 - c1) as f64 * t).round() as i64;
                    let r = r1 + ((r2 - r1) as f64 * t).round() as i64;
                    plot(c, r, ch);
                }
            }
            DrawCommand::Text { .. } => {}
        }
    }
    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x1: f32, y1: f32, x2: f32, y2: f32, color: Rgb) -> DrawCommand {
        DrawCommand::Line {
            x1,
            y1,
            x2,
            y2,
            width: 1.0,
            color,
        }
    }

    #[test]
    fn test_playhead_column() {
        let grid = rasterize(&[line(20.0, 0.0, 20.0, 100.0, PLAYHEAD)], (100.0, 100.0), 10, 5);
        for row in &grid {
            assert_eq!(row[2], '│');
            assert_eq!(row.iter().filter(|&&c| c != ' ').count(), 1);
        }
    }

    #[test]
    fn test_later_commands_overwrite() {
        let cmds = [
            line(0.0, 50.0, 100.0, 50.0, GRID),
            line(0.0, 50.0, 50.0, 50.0, HIT),
        ];
        let grid = rasterize(&cmds, (100.0, 100.0), 10, 5);
        assert_eq!(grid[2][0], '●');
        assert_eq!(grid[2][9], '·');
    }

    #[test]
    fn test_offscreen_points_dropped() {
        let grid = rasterize(&[line(-50.0, 10.0, -10.0, 10.0, MISS)], (100.0, 100.0), 10, 5);
        assert!(grid.iter().flatten().all(|&c| c == ' '));
    }

    #[test]
    fn test_note_bar_row() {
        let bar = DrawCommand::FillRect {
            x: 10.0,
            y: 76.0,
            width: 30.0,
            height: 8.0,
            color: TARGET,
        };
        let grid = rasterize(&[bar], (100.0, 100.0), 10, 5);
        assert_eq!(grid[4][1..4], ['▬', '▬', '▬']);
        assert_eq!(grid[4][0], ' ');
    }

    #[test]
    fn test_zero_canvas_is_blank() {
        let grid = rasterize(&[line(0.0, 0.0, 1.0, 1.0, HIT)], (0.0, 0.0), 4, 2);
        assert_eq!(grid, vec![vec![' '; 4]; 2]);
    }
}
