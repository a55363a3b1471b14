//! Price ticker board with direction tracking

use crate::protocol::TickerUpdate;

/// Direction of the latest price move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceDirection {
    Up,
    Down,
    Neutral,
}

/// Current and previous ticker, for change indication
#[derive(Debug, Default)]
pub struct TickerBoard {
    current: Option<TickerUpdate>,
    previous: Option<TickerUpdate>,
}

impl TickerBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: TickerUpdate) {
        self.previous = self.current.take();
        self.current = Some(update);
    }

    pub fn current(&self) -> Option<&TickerUpdate> {
        self.current.as_ref()
    }

    pub fn has_data(&self) -> bool {
        self.current.is_some()
    }

    /// Neutral until two updates have arrived
    pub fn direction(&self) -> PriceDirection {
        match (&self.current, &self.previous) {
            (Some(current), Some(previous)) => {
                if current.price > previous.price {
                    PriceDirection::Up
                } else if current.price < previous.price {
                    PriceDirection::Down
                } else {
                    PriceDirection::Neutral
                }
            }
            _ => PriceDirection::Neutral,
        }
    }
}
