use crate::{LensletError, Result};

/// State of the detector exposure after a synthesis cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationState {
    /// Cycle `counter` has been added to the exposure
    Accumulating { counter: usize },
    /// The exposure has been read out and the slopes updated
    Finalized,
}

/// What a synthesis cycle does with the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cycle {
    /// Zeroes the frame before accumulating
    pub reset: bool,
    /// Reads out the frame after accumulating
    pub finalize: bool,
}

/// Exposure of `n_iter` synthesis cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Integration {
    n_iter: usize,
    counter: usize,
}
impl Integration {
    pub fn new(n_iter: usize) -> Self {
        Self { n_iter, counter: 0 }
    }
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
    /// Index of the last processed cycle, 0 before the first one
    pub fn counter(&self) -> usize {
        self.counter
    }
    /// Whether subaperture images are read out at the end of the exposure only
    pub fn is_integrating(&self) -> bool {
        self.n_iter > 1
    }
    /// Index of the next cycle
    pub fn next(&self) -> usize {
        self.counter % self.n_iter + 1
    }
    /// Restarts the exposure
    pub fn restart(&mut self) {
        self.counter = 0;
    }
    /// Starts cycle `counter`
    pub fn start(&mut self, counter: usize) -> Result<Cycle> {
        if counter == 0 || counter > self.n_iter {
            return Err(LensletError::Counter {
                counter,
                n_iter: self.n_iter,
            });
        }
        self.counter = counter;
        log::trace!("integration cycle #{}/{}", counter, self.n_iter);
        Ok(Cycle {
            reset: counter == 1,
            finalize: counter == self.n_iter,
        })
    }
    /// State reached after a cycle
    pub fn state(&self, cycle: Cycle) -> IntegrationState {
        if cycle.finalize {
            IntegrationState::Finalized
        } else {
            IntegrationState::Accumulating {
                counter: self.counter,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_advance() {
        let mut integration = Integration::new(3);
        let cycles: Vec<_> = (0..4)
            .map(|_| {
                let counter = integration.next();
                integration.start(counter).map(|c| integration.state(c)).unwrap()
            })
            .collect();
        assert_eq!(
            cycles,
            vec![
                IntegrationState::Accumulating { counter: 1 },
                IntegrationState::Accumulating { counter: 2 },
                IntegrationState::Finalized,
                IntegrationState::Accumulating { counter: 1 },
            ]
        );
    }

    #[test]
    fn single_shot() {
        let mut integration = Integration::new(1);
        assert!(!integration.is_integrating());
        let cycle = integration.start(1).unwrap();
        assert!(cycle.reset && cycle.finalize);
        assert_eq!(integration.next(), 1);
    }

    #[test]
    fn out_of_range() {
        let mut integration = Integration::new(2);
        assert!(integration.start(0).is_err());
        assert!(integration.start(3).is_err());
    }
}
