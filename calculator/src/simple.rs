use tracing::debug;

use crate::{CalculatorError, NetPoetteringCalculator, NetPoetteringCalculatorBase, State};
use sdbus_vtable::MethodErr;

/// Integer arithmetic on 64 bit values. Results wrap around on overflow.
#[derive(Debug)]
pub struct SimpleCalculator {
    base: NetPoetteringCalculatorBase,
}

impl SimpleCalculator {
    pub fn new(base: NetPoetteringCalculatorBase) -> Self { SimpleCalculator { base } }
}

impl NetPoetteringCalculator for SimpleCalculator {
    fn base(&self) -> &NetPoetteringCalculatorBase { &self.base }
    fn base_mut(&mut self) -> &mut NetPoetteringCalculatorBase { &mut self.base }

    fn multiply(&mut self, x: i64, y: i64) -> Result<i64, MethodErr> {
        Ok(self.base.set_last_result(x.wrapping_mul(y)))
    }

    fn divide(&mut self, x: i64, y: i64) -> Result<i64, MethodErr> {
        if y == 0 {
            self.base.set_status(State::Error);
            debug!(x, "division by zero");
            return Err(CalculatorError::DivisionByZero.into());
        }
        Ok(self.base.set_last_result(x.wrapping_div(y)))
    }

    fn clear(&mut self) -> Result<(), MethodErr> {
        let v = self.base.last_result();
        self.base.set_last_result(0);
        self.base.cleared(v);
        Ok(())
    }
}
