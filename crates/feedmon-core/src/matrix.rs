use crate::series::Sample;

pub const BLANK: char = ' ';
pub const MARK: char = 'X';

/// Rectangular character grid, row-major, `y` grows downward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<char>,
}

impl Grid {
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![BLANK; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: usize, y: usize) -> Option<char> {
        if x < self.width && y < self.height {
            Some(self.cells[y * self.width + x])
        } else {
            None
        }
    }

    pub fn set(&mut self, x: usize, y: usize, value: char) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = value;
        }
    }

    pub fn row(&self, y: usize) -> &[char] {
        let start = y * self.width;
        &self.cells[start..start + self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[char]> + '_ {
        (0..self.height).map(move |y| self.row(y))
    }

    pub fn to_lines(&self) -> Vec<String> {
        self.rows().map(|row| row.iter().collect()).collect()
    }
}

/// Draws one mark per column at the row matching the rounded sample; row 0 is the maximum.
pub fn series_to_grid(series: &[Sample]) -> Grid {
    let levels: Vec<i64> = if series.is_empty() {
        vec![0]
    } else {
        series.iter().map(|value| value.round() as i64).collect()
    };
    let top = levels.iter().copied().max().unwrap_or(0).max(0);
    let height = top as usize + 1;
    let mut grid = Grid::blank(levels.len(), height);
    for (col, level) in levels.iter().enumerate() {
        if *level < 0 {
            continue;
        }
        let row = (top - level) as usize;
        grid.set(col, row, MARK);
    }
    grid
}

/// Lays out text lines as a grid padded with blanks to the longest line.
pub fn text_to_grid(text: &str) -> Grid {
    let lines: Vec<Vec<char>> = text.split('\n').map(|line| line.chars().collect()).collect();
    let width = lines.iter().map(Vec::len).max().unwrap_or(0);
    let mut grid = Grid::blank(width, lines.len());
    for (y, line) in lines.iter().enumerate() {
        for (x, ch) in line.iter().enumerate() {
            grid.set(x, y, *ch);
        }
    }
    grid
}

/// Merges two grids at their offsets; where they overlap the overlay wins.
pub fn compose(
    base: &Grid,
    base_x: usize,
    base_y: usize,
    overlay: &Grid,
    overlay_x: usize,
    overlay_y: usize,
) -> Grid {
    let extent = |grid: &Grid, x: usize, y: usize| {
        if grid.is_empty() {
            (0, 0)
        } else {
            (grid.width() + x, grid.height() + y)
        }
    };
    let (base_w, base_h) = extent(base, base_x, base_y);
    let (overlay_w, overlay_h) = extent(overlay, overlay_x, overlay_y);

    let mut output = Grid::blank(base_w.max(overlay_w), base_h.max(overlay_h));
    for (grid, offset_x, offset_y) in [(base, base_x, base_y), (overlay, overlay_x, overlay_y)] {
        if grid.is_empty() {
            continue;
        }
        for y in 0..grid.height() {
            for (x, ch) in grid.row(y).iter().enumerate() {
                output.set(x + offset_x, y + offset_y, *ch);
            }
        }
    }
    output
}
