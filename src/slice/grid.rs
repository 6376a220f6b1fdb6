//! Dense 2D array addressed by 1-based pixel coordinates

/// Row-major grid, `u` fastest. Pixel `(1, 1)` is the first element.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid2<T> {
    width: i32,
    height: i32,
    data: Vec<T>,
}

impl<T: Copy> Grid2<T> {
    /// Grid filled with `value`. Negative sizes are treated as zero.
    pub fn filled(width: i32, height: i32, value: T) -> Self {
        let (width, height) = (width.max(0), height.max(0));
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Grid with every pixel computed from its 1-based coordinates
    pub fn from_fn(width: i32, height: i32, mut f: impl FnMut(i32, i32) -> T) -> Self {
        let (width, height) = (width.max(0), height.max(0));
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for v in 1..=height {
            for u in 1..=width {
                data.push(f(u, v));
            }
        }
        Self { width, height, data }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn contains(&self, u: i32, v: i32) -> bool {
        u >= 1 && v >= 1 && u <= self.width && v <= self.height
    }

    /// Value at `(u, v)`, `None` outside the grid
    pub fn get(&self, u: i32, v: i32) -> Option<T> {
        self.index(u, v).map(|i| self.data[i])
    }

    /// Set `(u, v)`. Returns false outside the grid.
    pub fn set(&mut self, u: i32, v: i32, value: T) -> bool {
        match self.index(u, v) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    /// Elements in row-major order
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// New grid of the same shape with `f` applied to every element
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Grid2<U> {
        Grid2 {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// `((u, v), value)` for every pixel, row by row
    pub fn pixels(&self) -> impl Iterator<Item = ((i32, i32), T)> + '_ {
        let width = self.width.max(1);
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &x)| (((i as i32 % width) + 1, (i as i32 / width) + 1), x))
    }

    fn index(&self, u: i32, v: i32) -> Option<usize> {
        if !self.contains(u, v) {
            return None;
        }
        Some((u - 1) as usize + (v - 1) as usize * self.width as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_based_access() {
        let mut grid = Grid2::filled(3, 2, 0u8);
        assert!(grid.set(3, 2, 7));
        assert_eq!(grid.get(3, 2), Some(7));
        assert_eq!(grid.as_slice()[5], 7);
        assert_eq!(grid.get(0, 1), None);
        assert_eq!(grid.get(4, 1), None);
        assert!(!grid.set(1, 3, 1));
    }

    #[test]
    fn test_from_fn_order() {
        let grid = Grid2::from_fn(3, 2, |u, v| u * 10 + v);
        assert_eq!(grid.as_slice(), &[11, 21, 31, 12, 22, 32]);
        let pixels: Vec<_> = grid.pixels().map(|(p, _)| p).collect();
        assert_eq!(pixels[4], (2, 2));
    }

    #[test]
    fn test_map() {
        let grid = Grid2::from_fn(2, 2, |u, v| (u + v) as i16);
        let floats = grid.map(|x| x as f32 * 0.5);
        assert_eq!(floats.get(2, 2), Some(2.0));
    }
}
