#![no_std]

//! ATmega328P bindings for the uartjson transport and tick source.

use arduino_hal::pac;
use uartjson::transport::{HwError, LineError, Status, UartHw};

/// CPU clock of the Uno board.
pub const CPU_HZ: u32 = 16_000_000;
pub const BAUD: u32 = 57_600;

/// USART0 through its register block.
///
/// Zero-sized so it can sit inside a `static` transport; the transport's
/// critical section is what serializes register access.
pub struct Usart0;

impl Usart0 {
    pub const fn new() -> Self {
        Usart0
    }

    fn regs(&self) -> &'static pac::usart0::RegisterBlock {
        // SAFETY: the register block lives at a fixed address for the whole
        // program, and only the owning transport touches it.
        unsafe { &*pac::USART0::ptr() }
    }
}

impl Default for Usart0 {
    fn default() -> Self {
        Self::new()
    }
}

impl UartHw for Usart0 {
    fn init(&mut self) -> Result<(), HwError> {
        // Double speed mode: UBRR = f / (8 * baud) - 1, rounded.
        let ubrr = (CPU_HZ + 4 * BAUD) / (8 * BAUD) - 1;
        let ubrr = u16::try_from(ubrr).map_err(|_| HwError::InvalidConfig)?;
        if ubrr > 0x0FFF {
            return Err(HwError::InvalidConfig);
        }

        let regs = self.regs();
        regs.ubrr0().write(|w| unsafe { w.bits(ubrr) });
        regs.ucsr0a().write(|w| w.u2x0().set_bit());
        regs.ucsr0c().write(|w| w.ucsz0().chr8());
        regs.ucsr0b()
            .write(|w| w.rxen0().set_bit().txen0().set_bit());
        Ok(())
    }

    fn status(&self) -> Status {
        let a = self.regs().ucsr0a().read();
        Status {
            tx_empty: a.udre0().bit_is_set(),
            rx_not_empty: a.rxc0().bit_is_set(),
            overrun: a.dor0().bit_is_set(),
            framing: a.fe0().bit_is_set(),
            parity: a.upe0().bit_is_set(),
            // No noise detector on this part.
            noise: false,
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.regs().udr0().write(|w| unsafe { w.bits(byte) });
    }

    fn read_byte(&mut self) -> u8 {
        self.regs().udr0().read().bits()
    }

    fn set_tx_interrupt(&mut self, enabled: bool) {
        self.regs().ucsr0b().modify(|_, w| w.udrie0().bit(enabled));
    }

    fn set_rx_interrupt(&mut self, enabled: bool) {
        self.regs().ucsr0b().modify(|_, w| w.rxcie0().bit(enabled));
    }

    fn tx_interrupt_enabled(&self) -> bool {
        self.regs().ucsr0b().read().udrie0().bit_is_set()
    }

    fn rx_interrupt_enabled(&self) -> bool {
        self.regs().ucsr0b().read().rxcie0().bit_is_set()
    }

    fn clear_error(&mut self, _error: LineError) {
        // Error flags belong to the byte at the head of the receive FIFO and
        // clear when it is read.
        let _ = self.read_byte();
    }
}

/// Start Timer0 in CTC mode with a 1 kHz compare-match interrupt.
pub fn start_tick_timer(tc0: pac::TC0) {
    const PRESCALER: u32 = 64;
    const TOP: u32 = CPU_HZ / PRESCALER / 1_000 - 1;

    tc0.tccr0a().write(|w| w.wgm0().ctc());
    tc0.ocr0a().write(|w| unsafe { w.bits(TOP as u8) });
    tc0.tccr0b().write(|w| w.cs0().prescale_64());
    tc0.timsk0().write(|w| w.ocie0a().set_bit());
}
