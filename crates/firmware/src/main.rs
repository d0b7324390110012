#![no_std]
// uartbeat - Serial Echo Firmware
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.
#![no_main]

use core::cell::RefCell;
use core::ptr::{read_volatile, write_volatile};
use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::NVIC;
use cortex_m_rt::{entry, exception};
use critical_section::Mutex;
use panic_halt as _;
use uartbeat_serial::{
    Countdown, DefaultPort, Heartbeat, HeartbeatSettings, Interrupts, SerialWrite, StatusOutput,
    TickRate, RX_SLOTS, TX_SLOTS,
};

// Reset clock is the 8 MHz HSI.
const SYSCLK_HZ: u32 = 8_000_000;
const BAUD: u32 = 9600;
const TICKS_PER_MS: u32 = 1;

const RCC_APB2ENR: *mut u32 = 0x4002_1018 as *mut u32;
const APB2ENR_IOPAEN: u32 = 1 << 2;
const APB2ENR_IOPCEN: u32 = 1 << 4;
const APB2ENR_USART1EN: u32 = 1 << 14;

const GPIOA_CRH: *mut u32 = 0x4001_0804 as *mut u32;
const GPIOC_CRH: *mut u32 = 0x4001_1004 as *mut u32;
const GPIOC_ODR: *mut u32 = 0x4001_100C as *mut u32;

const USART1_BASE: u32 = 0x4001_3800;
const USART1_SR: *mut u32 = USART1_BASE as *mut u32;
const USART1_DR: *mut u32 = (USART1_BASE + 0x04) as *mut u32;
const USART1_BRR: *mut u32 = (USART1_BASE + 0x08) as *mut u32;
const USART1_CR1: *mut u32 = (USART1_BASE + 0x0C) as *mut u32;

const SR_RXNE: u32 = 1 << 5;
const SR_TC: u32 = 1 << 6;
const CR1_RE: u32 = 1 << 2;
const CR1_TE: u32 = 1 << 3;
const CR1_RXNEIE: u32 = 1 << 5;
const CR1_TCIE: u32 = 1 << 6;
const CR1_UE: u32 = 1 << 13;

#[derive(Clone, Copy)]
struct Usart1Irq;

// SAFETY: 37 is the USART1 global interrupt on STM32F10x.
unsafe impl InterruptNumber for Usart1Irq {
    fn number(self) -> u16 {
        37
    }
}

struct Usart1;

impl SerialWrite for Usart1 {
    fn write_byte(&mut self, byte: u8) {
        unsafe { write_volatile(USART1_DR, byte as u32) }
    }
}

/// Blue pill LED on PC13. Only the main loop drives it.
struct Pc13;

impl StatusOutput for Pc13 {
    fn toggle(&mut self) {
        unsafe {
            let odr = read_volatile(GPIOC_ODR);
            write_volatile(GPIOC_ODR, odr ^ (1 << 13));
        }
    }
}

static COUNTDOWN: Countdown = Countdown::new(0);
static USART1_HANDLERS: Mutex<RefCell<Option<Interrupts<'static, RX_SLOTS, TX_SLOTS>>>> =
    Mutex::new(RefCell::new(None));

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

unsafe fn modify(reg: *mut u32, f: impl FnOnce(u32) -> u32) {
    write_volatile(reg, f(read_volatile(reg)));
}

fn init_usart1() {
    unsafe {
        modify(RCC_APB2ENR, |v| {
            v | APB2ENR_IOPAEN | APB2ENR_IOPCEN | APB2ENR_USART1EN
        });
        // PA9 TX alternate push-pull 50 MHz, PA10 RX floating input
        modify(GPIOA_CRH, |v| (v & !0xFF0) | (0xB << 4) | (0x4 << 8));
        // PC13 push-pull output 2 MHz
        modify(GPIOC_CRH, |v| (v & !(0xF << 20)) | (0x2 << 20));

        write_volatile(USART1_BRR, (SYSCLK_HZ + BAUD / 2) / BAUD);
        write_volatile(
            USART1_CR1,
            CR1_UE | CR1_TE | CR1_RE | CR1_RXNEIE | CR1_TCIE,
        );
    }
}

#[entry]
fn main() -> ! {
    let Some(mut cp) = cortex_m::Peripherals::take() else {
        halt()
    };
    let Some(port) = cortex_m::singleton!(: DefaultPort = DefaultPort::new()) else {
        halt()
    };

    let (mut serial, handlers) = port.split();
    critical_section::with(|cs| {
        USART1_HANDLERS.borrow_ref_mut(cs).replace(handlers);
    });

    let mut app = Heartbeat::new(HeartbeatSettings {
        tick_rate: TickRate::new(TICKS_PER_MS),
        ..HeartbeatSettings::DEFAULT
    });
    app.arm(&COUNTDOWN);

    init_usart1();

    cp.SYST.set_clock_source(SystClkSource::Core);
    cp.SYST.set_reload(SYSCLK_HZ / 1000 / TICKS_PER_MS - 1);
    cp.SYST.clear_current();
    cp.SYST.enable_interrupt();
    cp.SYST.enable_counter();

    unsafe { NVIC::unmask(Usart1Irq) };

    let mut uart = Usart1;
    let mut led = Pc13;
    loop {
        app.poll(&mut serial, &COUNTDOWN, &mut uart, &mut led);
    }
}

#[exception]
fn SysTick() {
    COUNTDOWN.on_tick_interrupt();
}

fn usart1() {
    critical_section::with(|cs| {
        let mut handlers = USART1_HANDLERS.borrow_ref_mut(cs);
        let Some(handlers) = handlers.as_mut() else {
            return;
        };

        let sr = unsafe { read_volatile(USART1_SR) };
        if sr & SR_RXNE != 0 {
            // Reading DR clears RXNE. A full ring drops the byte and counts it.
            let byte = unsafe { read_volatile(USART1_DR) } as u8;
            let _ = handlers.on_byte_received(byte);
        }
        if sr & SR_TC != 0 {
            // TC is rc_w0; clear it even when nothing follows.
            unsafe { write_volatile(USART1_SR, !SR_TC) };
            handlers.on_transmit_complete(&mut Usart1);
        }
    });
}

// No device crate: every external interrupt lands here.
#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    if irqn == Usart1Irq.number() as i16 {
        usart1();
    }
}
