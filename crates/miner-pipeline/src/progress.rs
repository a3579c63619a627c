//! Step progress reporting for strategies with `ShowProgress = true`.

/// Emits an `info!` event each time processing crosses a 10% boundary.
#[derive(Debug, Clone)]
pub struct Progress {
    text: String,
    maximum: usize,
    current: usize,
    next_percent: usize,
}

impl Progress {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            maximum: 0,
            current: 0,
            next_percent: 0,
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Restart the count with a new number of steps.
    pub fn set_maximum_steps(&mut self, steps: usize) {
        self.maximum = steps;
        self.current = 0;
        self.next_percent = 0;
    }

    /// Report the current step and advance. Returns the last percentage
    /// reported, if this call crossed a boundary.
    pub fn check_status(&mut self) -> Option<usize> {
        if self.maximum == 0 {
            return None;
        }
        let percent = (self.current.min(self.maximum) * 100) / self.maximum;
        let mut reported = None;
        while self.next_percent <= percent && self.next_percent <= 100 {
            tracing::info!(task = %self.text, percent = self.next_percent, "progress");
            reported = Some(self.next_percent);
            self.next_percent += 10;
        }
        self.current += 1;
        reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_ten_percent() {
        let mut p = Progress::new("Filter::test");
        p.set_maximum_steps(20);
        let mut reported = Vec::new();
        for _ in 0..=20 {
            if let Some(pct) = p.check_status() {
                reported.push(pct);
            }
        }
        assert_eq!(reported, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn small_counts_jump_boundaries() {
        let mut p = Progress::new("x");
        p.set_maximum_steps(3);
        assert_eq!(p.check_status(), Some(0));
        assert_eq!(p.check_status(), Some(30));
        assert_eq!(p.check_status(), Some(60));
        assert_eq!(p.check_status(), Some(100));
        assert_eq!(p.check_status(), None);
    }

    #[test]
    fn zero_steps_is_silent() {
        let mut p = Progress::new("x");
        p.set_maximum_steps(0);
        assert_eq!(p.check_status(), None);
    }
}
