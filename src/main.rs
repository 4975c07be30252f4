#![feature(type_alias_impl_trait, lint_reasons)]
#![no_std]
#![no_main]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::wildcard_imports)]

use defmt_rtt as _;
use fermenter_ctrl::thermometer::Unit;
use panic_probe as _;

/// Label shown on the status screen
const NAME: &str = "Fermenter";
/// Unit the controller works in
const UNIT: Unit = Unit::Fahrenheit;

#[rtic::app(device = stm32f0xx_hal::pac, dispatchers = [USART1, TIM14])]
mod app {
    use defmt::*;
    use fermenter_ctrl::{
        controller::Controller,
        ds18b20::Resolution,
        onewire::OneWire,
        relay::PinRelay,
        terminal::{get_line, handle_line, is_newline, Buffer},
        thermometer::{ds18b20::Ds18b20Thermometer, Thermometer},
    };
    use rtic_monotonics::{
        stm32::{Tim2 as Mono, *},
        Monotonic,
    };
    use stm32f0xx_hal::{
        delay::Delay,
        gpio::{
            gpioa::{PA15, PA2},
            Alternate, OpenDrain, Output, Pin, PushPull, AF1,
        },
        pac::{Interrupt, IWDG, USART2},
        prelude::*,
        serial,
        serial::{Event, Serial},
        watchdog::Watchdog,
    };

    use crate::{NAME, UNIT};

    type Relay = PinRelay<Pin<Output<PushPull>>>;

    #[shared]
    struct Shared {
        usart: Serial<USART2, PA2<Alternate<AF1>>, PA15<Alternate<AF1>>>,
        buffer: Buffer,
        controller: Controller<Relay, Relay>,
        resolution: Resolution,
    }

    #[local]
    struct Local {
        thermometer: Ds18b20Thermometer<OneWire<Pin<Output<OpenDrain>>>, Delay>,
    }

    #[init]
    fn init(mut cx: init::Context) -> (Shared, Local) {
        // Set system clock to 24 MHz
        let mut rcc = cx
            .device
            .RCC
            .configure()
            .hsi48()
            .sysclk(24.mhz())
            .pclk(24.mhz())
            .hclk(24.mhz())
            .freeze(&mut cx.device.FLASH);

        trace!("sysclk: {}", rcc.clocks.sysclk().0);
        trace!("hclk: {}", rcc.clocks.hclk().0);
        trace!("pclk: {}", rcc.clocks.pclk().0);

        // Enable tim2 monotonic
        let token = rtic_monotonics::create_stm32_tim2_monotonic_token!();
        Mono::start(24_000_000, token);

        // Setup systick delay, used for 1-Wire timing and the conversion wait
        let delay = Delay::new(cx.core.SYST, &rcc);

        // Setup GPIO
        let gpioa = cx.device.GPIOA.split(&mut rcc);
        let gpiob = cx.device.GPIOB.split(&mut rcc);

        let _ = watchdog::spawn(cx.device.IWDG);

        // Setup USART & USART interrupt
        let mut usart = Serial::usart2(
            cx.device.USART2,
            (
                gpioa.pa2.into_alternate_af1(&cx.cs),
                gpioa.pa15.into_alternate_af1(&cx.cs),
            ),
            115_200.bps(),
            &mut rcc,
        );
        usart.listen(Event::Rxne);
        rtic::pend(Interrupt::USART2);

        // Setup relays, both released until the controller commits a state
        let heater = PinRelay::new(gpiob.pb5.into_push_pull_output(&cx.cs).downgrade());
        let cooler = PinRelay::new(gpiob.pb4.into_push_pull_output(&cx.cs).downgrade());
        let controller = Controller::new(NAME, UNIT, heater, cooler);

        // Setup DS18B20
        let mut pa12 = gpioa.pa12.into_open_drain_output(&cx.cs);
        unwrap!(pa12.set_high());
        let mut thermometer = Ds18b20Thermometer::new(OneWire::new(pa12.downgrade()), delay, UNIT);

        for device in thermometer.devices() {
            match device {
                Ok(addr) => info!("Found device: {}", addr),
                Err(e) => {
                    warn!("Device search failed: {}", e);
                    break;
                }
            }
        }

        let resolution = match thermometer.read_resolution() {
            Ok(res) => {
                info!("Sensor resolution: {}", res);
                res
            }
            Err(e) => {
                warn!("Failed to read sensor resolution: {}", e);
                thermometer.resolution()
            }
        };

        // Launch temperature controller
        let _ = temp_controller::spawn();

        (
            Shared {
                usart,
                buffer: Buffer::new(),
                controller,
                resolution,
            },
            Local { thermometer },
        )
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        rtic::pend(Interrupt::USART2);

        loop {
            cortex_m::asm::wfi();
        }
    }

    #[task(priority = 2)]
    async fn watchdog(_: watchdog::Context, wdg: IWDG) {
        let mut wdg = Watchdog::new(wdg);
        wdg.start(1.hz());

        loop {
            wdg.feed();
            Mono::delay(100.millis()).await;
        }
    }

    /// Reads the sensor and runs the controller once per tick.
    ///
    /// The read blocks for the conversion time, so this runs below the watchdog and the terminal.
    #[task(priority = 1, local = [thermometer], shared = [controller, resolution])]
    async fn temp_controller(mut cx: temp_controller::Context) {
        let interval = cx
            .shared
            .controller
            .lock(|c| u64::from(c.config().tick_interval_ms));
        let mut now = Mono::now();

        loop {
            trace!("temp_controller");

            let resolution = cx.shared.resolution.lock(|res| *res);
            if resolution != cx.local.thermometer.resolution() {
                match cx.local.thermometer.set_resolution(resolution) {
                    Ok(()) => info!("Sensor resolution set to {}", resolution),
                    Err(e) => warn!("Failed to set sensor resolution: {}", e),
                }
            }

            let reading = cx.local.thermometer.read();

            cx.shared.controller.lock(|controller| {
                controller.update(reading);

                let status = controller.status();
                debug!(
                    "{}: {}, current {}, target {}, {}",
                    status.name, status.state, status.current, status.target, status.pending
                );
                if controller.is_alarm() {
                    warn!("{}: needs attention", status.name);
                }
            });

            now += interval.millis();
            Mono::delay_until(now).await;
        }
    }

    #[task(priority = 2, shared = [usart, buffer, controller, resolution])]
    async fn terminal(mut cx: terminal::Context) {
        while let Some(line) = cx.shared.buffer.lock(get_line) {
            (
                &mut cx.shared.usart,
                &mut cx.shared.controller,
                &mut cx.shared.resolution,
            )
                .lock(|usart, controller, resolution| {
                    if handle_line(&line, controller, resolution, usart).is_err() {
                        error!("Failed to write to UART");
                    }
                });
        }
    }

    #[task(binds = USART2, local = [times: u32 = 0], shared = [usart, buffer])]
    fn usart2(cx: usart2::Context) {
        *cx.local.times += 1;

        // Read & echo all available bytes from the usart
        (cx.shared.usart, cx.shared.buffer).lock(|usart, buffer| loop {
            match usart.read() {
                Ok(b) => {
                    // Echo back
                    if is_newline(b) {
                        let _ = nb::block!(usart.write(b'\r'));
                        let _ = nb::block!(usart.write(b'\n'));
                    } else {
                        let _ = nb::block!(usart.write(b));
                    }

                    // Drop the partial line rather than let it grow past a command
                    if buffer.push_back(b).is_err() {
                        warn!("Terminal buffer overflow, discarding input");
                        buffer.clear();
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => {
                    match e {
                        serial::Error::Framing => warn!("USART error: Framing"),
                        serial::Error::Noise => warn!("USART error: Noise"),
                        serial::Error::Overrun => warn!("USART error: Overrun"),
                        serial::Error::Parity => warn!("USART error: Parity"),
                        _ => warn!("USART error: Unknown"),
                    }
                    break;
                }
            }
        });

        trace!("USART2 interrupt fired: {}", *cx.local.times);

        // Trigger terminal task to handle input
        let _ = terminal::spawn();
    }

    timestamp!("{=u64:us}", {
        Mono::now().duration_since_epoch().to_micros()
    });
}
