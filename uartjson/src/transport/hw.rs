// SPDX-License-Identifier: Apache-2.0

//! The hardware side of the transport: what a UART peripheral must offer.

/// Snapshot of the peripheral status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    /// Transmit data register can take another byte.
    pub tx_empty: bool,
    /// A received byte is waiting in the data register.
    pub rx_not_empty: bool,
    pub overrun: bool,
    pub framing: bool,
    pub parity: bool,
    pub noise: bool,
}

impl Status {
    /// First raised line error in detection order, if any.
    pub fn line_error(&self) -> Option<LineError> {
        LineError::DETECTION_ORDER
            .into_iter()
            .find(|error| error.is_raised(self))
    }
}

/// Receive-side line faults reported by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    Overrun,
    Framing,
    Parity,
    Noise,
}

impl LineError {
    /// Order in which simultaneous faults are resolved; the first raised
    /// flag is the one reported.
    pub const DETECTION_ORDER: [LineError; 4] = [
        LineError::Overrun,
        LineError::Framing,
        LineError::Parity,
        LineError::Noise,
    ];

    pub fn is_raised(self, status: &Status) -> bool {
        match self {
            LineError::Overrun => status.overrun,
            LineError::Framing => status.framing,
            LineError::Parity => status.parity,
            LineError::Noise => status.noise,
        }
    }
}

impl core::fmt::Display for LineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            LineError::Overrun => "overrun",
            LineError::Framing => "framing",
            LineError::Parity => "parity",
            LineError::Noise => "noise",
        };
        f.write_str(name)
    }
}

/// Peripheral bring-up failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// The peripheral or its clock could not be reached.
    NotPresent,
    /// The requested line settings are not achievable.
    InvalidConfig,
}

impl core::fmt::Display for HwError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HwError::NotPresent => f.write_str("peripheral not present"),
            HwError::InvalidConfig => f.write_str("invalid line configuration"),
        }
    }
}

/// A UART peripheral driven by [`Transport`](super::Transport).
///
/// Register layout, pins and clocks stay behind this trait. Every method is
/// called with the transport's critical section held, so implementations
/// can touch registers without further locking.
pub trait UartHw {
    /// Clocks, pins and baud rate. Leaves both interrupts disabled.
    fn init(&mut self) -> Result<(), HwError>;
    fn status(&self) -> Status;
    /// Write the transmit data register.
    fn write_byte(&mut self, byte: u8);
    /// Read the receive data register.
    fn read_byte(&mut self) -> u8;
    fn set_tx_interrupt(&mut self, enabled: bool);
    fn set_rx_interrupt(&mut self, enabled: bool);
    fn tx_interrupt_enabled(&self) -> bool;
    fn rx_interrupt_enabled(&self) -> bool;
    /// Acknowledge one line fault flag.
    fn clear_error(&mut self, error: LineError);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_error_when_clean() {
        assert_eq!(Status::default().line_error(), None);
    }

    #[test]
    fn test_overrun_wins_over_everything() {
        let status = Status {
            overrun: true,
            framing: true,
            parity: true,
            noise: true,
            ..Default::default()
        };
        assert_eq!(status.line_error(), Some(LineError::Overrun));
    }

    #[test]
    fn test_hw_error_display() {
        assert_eq!(format!("{}", HwError::NotPresent), "peripheral not present");
        assert_eq!(
            format!("{}", crate::transport::TransportError::from(HwError::InvalidConfig)),
            "hardware: invalid line configuration"
        );
    }

    #[test]
    fn test_parity_is_checked_before_noise() {
        let status = Status {
            parity: true,
            noise: true,
            ..Default::default()
        };
        assert_eq!(status.line_error(), Some(LineError::Parity));
    }
}
