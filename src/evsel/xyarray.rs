/// Dense two-dimensional table indexed by (cpu index, thread index).
#[derive(Debug)]
pub struct Xyarray<T> {
    y_len: usize,
    entries: Vec<T>,
}

impl<T: Default> Xyarray<T> {
    pub fn new(x_len: usize, y_len: usize) -> Self {
        let mut entries = Vec::with_capacity(x_len * y_len);
        entries.resize_with(x_len * y_len, T::default);
        Self { y_len, entries }
    }
}

impl<T> Xyarray<T> {
    pub fn x_len(&self) -> usize {
        match self.y_len {
            0 => 0,
            y_len => self.entries.len() / y_len,
        }
    }

    pub fn y_len(&self) -> usize {
        self.y_len
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if y >= self.y_len {
            return None;
        }
        self.entries.get(x * self.y_len + y)
    }

    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        if y >= self.y_len {
            return None;
        }
        self.entries.get_mut(x * self.y_len + y)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}
