//! ADS7843 Resistive Touchscreen Controller
//!
//! Samples the controller whenever its PENIRQ line fires, maps the reading to
//! screen pixels and reports touch down/up to a registered handler.
//!
//! The driver runs in two contexts. [`Ads7843::on_interrupt`] and
//! [`Deferred::Poll`] do the bounded work of sampling and updating the touch
//! state. The registered [`TouchHandler`] is only ever invoked from
//! [`Deferred::Dispatch`], which the platform runs through its [`Scheduler`]
//! once the interrupt path has returned.

#![cfg_attr(not(test), no_std)]

use core::fmt;

use embedded_hal::{
    digital::InputPin,
    spi::{Mode, Operation, SpiDevice, MODE_3},
};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};

mod event;
pub mod transform;

pub use event::{TouchDirection, TouchEvent, TouchHandler};
pub use transform::{
    CalibrationConfig, DisplayGeometry, Orientation, TouchSample, MAX_ADC_VALUE,
};

/// SPI mode the bus must be configured with.
pub const SPI_MODE: Mode = MODE_3;
/// SPI clock the bus must be configured with. Faster clocks produce more
/// full-scale junk readings.
pub const SPI_FREQUENCY_HZ: u32 = 500_000;

// Control byte layout
const START_BIT: u8 = 7;
const CHANNEL_SHIFT: u8 = 4;
const MODE_BIT: u8 = 3;
const SINGLE_ENDED_BIT: u8 = 2;
const POWER_DOWN_BIT: u8 = 0;

// 0 selects 8-bit conversions, fast enough for small displays
const MODE_8BIT: u8 = 0;
const DIFFERENTIAL: u8 = 0;
// Keep the ADC powered between conversions
const POWER_ALWAYS_ON: u8 = 0;

const X_CHANNEL: u8 = 0b001;
const Y_CHANNEL: u8 = 0b101;

/// Attempts the acquisition loop makes before settling for whatever it read.
pub const DEFAULT_MAX_ATTEMPTS: u16 = 200;
/// How often a held touch is re-sampled, so the release is never missed.
pub const POLL_INTERVAL_MS: u32 = 100;

/// Error type for the ADS7843 driver
#[derive(Debug)]
pub enum Error<E> {
    Spi(E),
    Pin,
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(e) => write!(f, "SPI error: {:?}", e),
            Error::Pin => write!(f, "Pin error"),
        }
    }
}

/// Panel axis to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Control byte that starts a conversion on `axis`.
pub const fn command_byte(axis: Axis) -> u8 {
    let channel = match axis {
        Axis::X => X_CHANNEL,
        Axis::Y => Y_CHANNEL,
    };
    1 << START_BIT
        | channel << CHANNEL_SHIFT
        | MODE_8BIT << MODE_BIT
        | DIFFERENTIAL << SINGLE_ENDED_BIT
        | POWER_ALWAYS_ON << POWER_DOWN_BIT
}

/// The controller's PENIRQ line. Low while the panel is pressed.
pub trait IrqPin: InputPin {
    /// Input with pull-up. HALs that do this when the pin is created can keep
    /// the default.
    fn configure(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Enable the interrupt on any edge.
    fn enable_interrupt(&mut self) -> Result<(), Self::Error>;

    fn disable_interrupt(&mut self) -> Result<(), Self::Error>;
}

/// Monotonic time source.
pub trait Clock {
    /// Seconds since boot.
    fn uptime(&mut self) -> f64;
}

/// Work the driver hands to the platform to run later, outside interrupt
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Re-sample a touch that is still held.
    Poll,
    /// Deliver the current event to the handler.
    Dispatch,
}

/// Single-shot deferred execution. When `delay_ms` has elapsed the platform
/// must call [`Ads7843::run_deferred`] with `task`.
pub trait Scheduler {
    fn schedule(&mut self, delay_ms: u32, task: Deferred);
}

pub trait TouchController {
    type Error;

    fn read_sample(&mut self) -> Result<TouchSample, Self::Error>;
}

/// Everything needed to bring up the driver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ads7843Config {
    /// Chip select index on the shared bus.
    pub cs_index: u8,
    /// GPIO number of the PENIRQ line.
    pub irq_pin: u8,
    /// Mirror both axes, for panels mounted the other way round.
    pub flip_x_y: bool,
    pub geometry: DisplayGeometry,
    pub calibration: CalibrationConfig,
}

/// ADS7843 Options
#[derive(Debug)]
pub(crate) struct Ads7843Options {
    config: Ads7843Config,
    /// Ceiling for the acquisition loop, at least 1.
    max_attempts: u16,
}

impl Default for Ads7843Options {
    fn default() -> Self {
        Self {
            config: Ads7843Config::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// ADS7843 Builder
pub struct Ads7843Builder<SPI, IRQ, CLOCK, SCHED> {
    /// Underlying SPI device
    spi: SPI,
    /// PENIRQ line
    irq: IRQ,
    clock: CLOCK,
    scheduler: SCHED,
    /// Options
    options: Ads7843Options,
}

impl<SPI, IRQ, CLOCK, SCHED> Ads7843Builder<SPI, IRQ, CLOCK, SCHED>
where
    SPI: SpiDevice,
    IRQ: IrqPin,
    CLOCK: Clock,
    SCHED: Scheduler,
{
    /// Creates a new Ads7843Builder instance.
    pub fn new(spi: SPI, irq: IRQ, clock: CLOCK, scheduler: SCHED) -> Self {
        Self {
            spi,
            irq,
            clock,
            scheduler,
            options: Ads7843Options::default(),
        }
    }

    /// Replaces the whole configuration record
    pub fn config(mut self, config: Ads7843Config) -> Self {
        self.options.config = config;
        self
    }

    /// Sets the pixel dimensions of the display
    pub fn dimensions(mut self, width: u16, height: u16) -> Self {
        self.options.config.geometry = DisplayGeometry::new(width, height);
        self
    }

    /// Sets the ADC calibration bounds
    pub fn calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.options.config.calibration = calibration;
        self
    }

    pub fn flip_axes(mut self, flip: bool) -> Self {
        self.options.config.flip_x_y = flip;
        self
    }

    /// Sets the acquisition retry ceiling
    pub fn max_attempts(mut self, attempts: u16) -> Self {
        self.options.max_attempts = attempts.max(1);
        self
    }

    /// Builds the driver and arms the touch interrupt.
    pub fn build(self) -> Result<Ads7843<SPI, IRQ, CLOCK, SCHED>, Error<SPI::Error>> {
        Ads7843::new(
            self.spi,
            self.irq,
            self.clock,
            self.scheduler,
            self.options,
        )
    }
}

/// ADS7843 driver
pub struct Ads7843<SPI, IRQ, CLOCK, SCHED> {
    /// Underlying SPI device
    spi: SPI,
    /// PENIRQ line
    irq: IRQ,
    clock: CLOCK,
    scheduler: SCHED,
    config: Ads7843Config,
    orientation: Orientation,
    max_attempts: u16,
    event: TouchEvent,
    /// Uptime at which the current press began
    press_started: Option<f64>,
    handler: Option<TouchHandler>,
    poll_armed: bool,
    dispatch_pending: bool,
}

impl<SPI, IRQ, CLOCK, SCHED> TouchController for Ads7843<SPI, IRQ, CLOCK, SCHED>
where
    SPI: SpiDevice,
    IRQ: IrqPin,
    CLOCK: Clock,
    SCHED: Scheduler,
{
    type Error = Error<SPI::Error>;

    fn read_sample(&mut self) -> Result<TouchSample, Self::Error> {
        let x_adc = self.read_axis(Axis::X)?;
        let y_adc = self.read_axis(Axis::Y)?;
        Ok(TouchSample::new(x_adc, y_adc))
    }
}

impl<SPI, IRQ, CLOCK, SCHED> Ads7843<SPI, IRQ, CLOCK, SCHED>
where
    SPI: SpiDevice,
    IRQ: IrqPin,
    CLOCK: Clock,
    SCHED: Scheduler,
{
    /// Create a new instance of the driver and arm the PENIRQ interrupt
    fn new(
        spi: SPI,
        mut irq: IRQ,
        clock: CLOCK,
        scheduler: SCHED,
        options: Ads7843Options,
    ) -> Result<Self, Error<SPI::Error>> {
        irq.configure().map_err(|_| Error::Pin)?;
        irq.enable_interrupt().map_err(|_| Error::Pin)?;

        let config = options.config;
        let orientation = config.geometry.orientation();
        let event = TouchEvent {
            orientation,
            ..TouchEvent::default()
        };

        log::info!(
            "cs_index={}, irq_pin={}, flip_x_y={}",
            config.cs_index,
            config.irq_pin,
            config.flip_x_y
        );
        log::info!(
            "width={}, height={}, orientation={:?}",
            config.geometry.width,
            config.geometry.height,
            orientation
        );
        Self::log_calibration(&config.calibration);

        Ok(Self {
            spi,
            irq,
            clock,
            scheduler,
            config,
            orientation,
            max_attempts: options.max_attempts.max(1),
            event,
            press_started: None,
            handler: None,
            poll_armed: false,
            dispatch_pending: false,
        })
    }

    fn log_calibration(calibration: &CalibrationConfig) {
        log::info!(
            "min_adc_x={}, max_adc_x={}, range_x={}",
            calibration.min_adc_x,
            calibration.max_adc_x,
            calibration.range_x()
        );
        log::info!(
            "min_adc_y={}, max_adc_y={}, range_y={}",
            calibration.min_adc_y,
            calibration.max_adc_y,
            calibration.range_y()
        );
        if calibration.range_x() <= 0 || calibration.range_y() <= 0 {
            log::warn!("Empty calibration range, positions on that axis will read 0");
        }
    }

    /// Disarm the interrupt and hand back the peripherals
    pub fn release(mut self) -> Result<(SPI, IRQ, CLOCK, SCHED), Error<SPI::Error>> {
        self.irq.disable_interrupt().map_err(|_| Error::Pin)?;
        Ok((self.spi, self.irq, self.clock, self.scheduler))
    }

    /// Convert one axis. The result is masked to the 7 bits an 8-bit
    /// conversion delivers in a single response byte.
    pub fn read_axis(&mut self, axis: Axis) -> Result<u8, Error<SPI::Error>> {
        let command = command_byte(axis);
        let mut rx_buf = [0u8; 1];
        self.spi
            .transaction(&mut [Operation::Write(&[command]), Operation::Read(&mut rx_buf)])
            .map_err(|e| {
                log::error!("SPI transaction failed for command {:#04x}: {:?}", command, e);
                Error::Spi(e)
            })?;
        Ok(rx_buf[0] & MAX_ADC_VALUE)
    }

    /// Read until a sample without a full-scale axis turns up.
    ///
    /// Bus errors count as a rejected attempt. After `max_attempts` the last
    /// reading is returned as is, so this always terminates.
    pub fn acquire(&mut self) -> TouchSample {
        let mut sample = TouchSample::invalid();
        for attempt in 1..=self.max_attempts {
            sample = self.read_sample().unwrap_or_else(|_| TouchSample::invalid());
            if sample.is_valid() {
                log::trace!("sample {:?} after {} attempt(s)", sample, attempt);
                return sample;
            }
        }
        log::debug!(
            "No valid sample in {} attempts, using {:?}",
            self.max_attempts,
            sample
        );
        sample
    }

    /// Entry point for the PENIRQ edge interrupt.
    pub fn on_interrupt(&mut self) -> Result<(), Error<SPI::Error>> {
        self.process()
    }

    /// Run a task previously passed to [`Scheduler::schedule`].
    pub fn run_deferred(&mut self, task: Deferred) -> Result<(), Error<SPI::Error>> {
        match task {
            Deferred::Poll => {
                // Released since this was scheduled
                if !self.poll_armed {
                    return Ok(());
                }
                self.poll_armed = false;
                self.process()
            }
            Deferred::Dispatch => {
                self.dispatch();
                Ok(())
            }
        }
    }

    fn process(&mut self) -> Result<(), Error<SPI::Error>> {
        self.irq.disable_interrupt().map_err(|_| Error::Pin)?;

        let sample = self.acquire();
        // Nothing usable within the ceiling: report the codes as read, at 0,0
        let (corrected, x, y) = if sample.is_valid() {
            transform::transform(
                sample,
                &self.config.geometry,
                &self.config.calibration,
                self.config.flip_x_y,
            )
        } else {
            (sample, 0, 0)
        };

        let released = match self.irq.is_high() {
            Ok(level) => level,
            Err(_) => {
                // Keep sampling a held press so its release is still seen
                if self.event.is_down() {
                    self.arm_poll();
                } else {
                    self.irq.enable_interrupt().ok();
                }
                return Err(Error::Pin);
            }
        };

        self.event.orientation = self.orientation;

        if released {
            self.press_started = None;
            self.poll_armed = false;

            if self.event.is_down() {
                self.event.direction = TouchDirection::Up;
                log::debug!("Touch up after {}s", self.event.down_seconds);
                self.schedule_dispatch();
            } else {
                log::trace!("Edge without a press, ignored");
            }

            if self.irq.enable_interrupt().is_err() {
                // Retry from the next poll until the line is armed again
                self.arm_poll();
                return Err(Error::Pin);
            }
        } else {
            self.event.direction = TouchDirection::Down;
            self.event.x = x;
            self.event.y = y;
            self.event.x_adc = corrected.x_adc;
            self.event.y_adc = corrected.y_adc;

            let now = self.clock.uptime();
            match self.press_started {
                Some(started) => self.event.down_seconds = (now - started) as f32,
                None => {
                    self.press_started = Some(now);
                    self.event.down_seconds = 0.0;
                    log::debug!("Touch down at ({}, {})", x, y);
                }
            }

            self.arm_poll();
            self.schedule_dispatch();
        }

        Ok(())
    }

    fn arm_poll(&mut self) {
        self.poll_armed = true;
        self.scheduler.schedule(POLL_INTERVAL_MS, Deferred::Poll);
    }

    fn schedule_dispatch(&mut self) {
        if self.dispatch_pending {
            return;
        }
        self.dispatch_pending = true;
        self.scheduler.schedule(0, Deferred::Dispatch);
    }

    fn dispatch(&mut self) {
        self.dispatch_pending = false;
        if let Some(handler) = self.handler {
            handler(&self.event);
        }
    }

    /// Whether the last reported direction was down
    pub fn is_touching(&self) -> bool {
        self.event.is_down()
    }

    /// Register the touch event handler, replacing any previous one
    pub fn set_handler(&mut self, handler: TouchHandler) {
        self.handler = Some(handler);
    }

    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    /// Current touch state
    pub fn event(&self) -> &TouchEvent {
        &self.event
    }

    /// Set the pixel dimensions of the display, applied from the next sample
    pub fn set_dimensions(&mut self, width: u16, height: u16) {
        self.config.geometry = DisplayGeometry::new(width, height);
        self.orientation = self.config.geometry.orientation();
        log::info!(
            "width={}, height={}, orientation={:?}",
            width,
            height,
            self.orientation
        );
    }

    pub fn dimensions(&self) -> DisplayGeometry {
        self.config.geometry
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn calibration(&self) -> CalibrationConfig {
        self.config.calibration
    }

    /// Replace the ADC calibration bounds
    pub fn set_calibration(&mut self, calibration: CalibrationConfig) {
        self.config.calibration = calibration;
        Self::log_calibration(&calibration);
    }

    pub fn flip_axes(&self) -> bool {
        self.config.flip_x_y
    }

    pub fn set_flip_axes(&mut self, flip: bool) {
        self.config.flip_x_y = flip;
    }

    pub fn config(&self) -> &Ads7843Config {
        &self.config
    }
}
