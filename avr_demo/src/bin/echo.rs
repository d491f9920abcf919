#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

//! Echoes every line received on USART0 back to the sender.

use avr_demo::Usart0;
use panic_halt as _;
use uartjson::{Echo, Transport};

static UART: Transport<Usart0> = Transport::new(Usart0::new());

#[avr_device::interrupt(atmega328p)]
fn USART_RX() {
    UART.on_interrupt();
}

#[avr_device::interrupt(atmega328p)]
fn USART_UDRE() {
    UART.on_interrupt();
}

#[arduino_hal::entry]
fn main() -> ! {
    if UART.init().is_err() {
        halt();
    }
    // SAFETY: all shared state is behind critical sections.
    unsafe { avr_device::interrupt::enable() };

    let mut echo = Echo::new(&UART);
    loop {
        echo.advance();
    }
}

fn halt() -> ! {
    loop {
        avr_device::asm::nop();
    }
}
