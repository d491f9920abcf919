#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

//! Reports the embedded JSON payload over USART0, one line every 500 ms.

use avr_demo::{Usart0, start_tick_timer};
use panic_halt as _;
use uartjson::{Phase, Pipeline, TickSource, Transport};

const PAYLOAD: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/payload.json"));

static UART: Transport<Usart0> = Transport::new(Usart0::new());
static TICKS: TickSource = TickSource::new();

#[avr_device::interrupt(atmega328p)]
fn TIMER0_COMPA() {
    TICKS.on_tick();
}

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
    let Some(dp) = arduino_hal::Peripherals::take() else {
        halt();
    };
    start_tick_timer(dp.TC0);
    if UART.init().is_err() {
        halt();
    }
    // SAFETY: all shared state is behind critical sections.
    unsafe { avr_device::interrupt::enable() };

    let mut pipeline = Pipeline::new(PAYLOAD, &UART, &TICKS);
    loop {
        if pipeline.phase() != Phase::Complete {
            pipeline.advance();
        }
    }
}

fn halt() -> ! {
    loop {
        avr_device::asm::nop();
    }
}
