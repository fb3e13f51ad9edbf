//! Read/write index tracking for the double-buffered chain targets.

/// Which of two chain targets is currently read and which is written.
///
/// Pure index math, no GPU dependency; `read_index() + write_index() == 1`
/// at all times.
#[derive(Debug, Default)]
pub struct PingPong {
    current: usize,
}

impl PingPong {
    pub fn new() -> Self {
        Self { current: 0 }
    }

    /// Index of the target holding the chain color produced so far.
    pub fn read_index(&self) -> usize {
        self.current
    }

    /// Index of the target the next color-writing stage renders into.
    pub fn write_index(&self) -> usize {
        1 - self.current
    }

    /// Flips the pair; called after a stage writes color.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_reading_zero_writing_one() {
        let pp = PingPong::new();
        assert_eq!(pp.read_index(), 0);
        assert_eq!(pp.write_index(), 1);
    }

    #[test]
    fn swap_exchanges_the_roles() {
        let mut pp = PingPong::new();
        pp.swap();
        assert_eq!(pp.read_index(), 1);
        assert_eq!(pp.write_index(), 0);
        pp.swap();
        assert_eq!(pp.read_index(), 0);
    }

    #[test]
    fn indices_always_cover_both_targets() {
        let mut pp = PingPong::new();
        for step in 0..64 {
            assert_eq!(
                pp.read_index() + pp.write_index(),
                1,
                "pair degenerated at step {step}"
            );
            pp.swap();
        }
    }
}
