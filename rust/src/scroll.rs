/// Decides whether a store change should move the view to the newest message.
///
/// The first population of a group view never scrolls (no jump on open);
/// after that every growth of the sequence scrolls exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScrollController {
    #[default]
    Uninitialized,
    Initialized { last_len: usize },
}

impl ScrollController {
    pub fn reset(&mut self) {
        *self = Self::Uninitialized;
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Initialized { .. })
    }

    /// Record the store length after a mutation. Returns true when the view
    /// should scroll.
    pub fn observe(&mut self, len: usize) -> bool {
        match self {
            Self::Uninitialized => {
                *self = Self::Initialized { last_len: len };
                false
            }
            Self::Initialized { last_len } => {
                let grew = len > *last_len;
                *last_len = len;
                grew
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScrollController;

    #[test]
    fn first_population_does_not_scroll() {
        let mut c = ScrollController::default();
        assert!(!c.observe(3));
        assert!(c.is_initialized());
    }

    #[test]
    fn growth_scrolls_once_and_shrink_or_same_does_not() {
        let mut c = ScrollController::default();
        assert!(!c.observe(3));
        assert!(c.observe(4));
        assert!(!c.observe(4));
        assert!(c.observe(5));
        assert!(!c.observe(2));
        assert!(c.observe(3));
    }

    #[test]
    fn empty_initial_load_still_initializes() {
        let mut c = ScrollController::default();
        assert!(!c.observe(0));
        assert!(c.observe(1));
    }

    #[test]
    fn reset_returns_to_uninitialized() {
        let mut c = ScrollController::default();
        c.observe(2);
        c.reset();
        assert!(!c.observe(10));
    }
}
