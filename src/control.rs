//! Typed device commands built on top of [`Device::execute_with_response`].
//! Every setter resolves to `true` when the device answers `["ok"]`.

use crate::device::Device;
use crate::error::Result;
use crate::protocol::{Method, Property};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const MIN_SMOOTH_MS: u64 = 30;
const MIN_FLOW_STEP_MS: u64 = 50;
const RESULT_OK: &str = "ok";

/// How a change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    Sudden,
    /// Gradual change over the given duration (at least 30 ms).
    Smooth(Duration),
}

impl Transition {
    pub fn smooth_ms(ms: u64) -> Self {
        Transition::Smooth(Duration::from_millis(ms))
    }

    fn params(self) -> [Value; 2] {
        match self {
            Transition::Sudden => [json!("sudden"), json!(0)],
            Transition::Smooth(d) => {
                let ms = (d.as_millis() as u64).max(MIN_SMOOTH_MS);
                [json!("smooth"), json!(ms)]
            }
        }
    }
}

/// Mode the light switches to when powered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerOnMode {
    #[default]
    Normal = 0,
    Ct = 1,
    Rgb = 2,
    Hsv = 3,
    ColorFlow = 4,
    Night = 5,
}

define_wire_enum! {
    pub enum AdjustAction {
        Increase = "increase",
        Decrease = "decrease",
        /// Wraps around after reaching the maximum
        Circle = "circle",
    }
}

define_wire_enum! {
    pub enum AdjustProperty {
        Bright = "bright",
        Ct = "ct",
        /// Only `circle` is valid for color
        Color = "color",
    }
}

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `0x00RRGGBB`, as the device expects it.
    pub fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn from_packed(value: u32) -> Self {
        Self {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }
}

/// One step of a color flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowExpression {
    Color {
        color: Rgb,
        brightness: i32,
        duration: Duration,
    },
    Temperature {
        kelvin: u32,
        brightness: i32,
        duration: Duration,
    },
    Sleep {
        duration: Duration,
    },
}

impl FlowExpression {
    /// `duration,mode,value,brightness`
    fn tuple(&self) -> [i64; 4] {
        let ms = |d: &Duration| (d.as_millis() as u64).max(MIN_FLOW_STEP_MS) as i64;
        match self {
            FlowExpression::Color {
                color,
                brightness,
                duration,
            } => [ms(duration), 1, color.packed() as i64, *brightness as i64],
            FlowExpression::Temperature {
                kelvin,
                brightness,
                duration,
            } => [ms(duration), 2, *kelvin as i64, *brightness as i64],
            FlowExpression::Sleep { duration } => [ms(duration), 7, 0, 0],
        }
    }
}

/// What the light does once a flow finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowEndAction {
    /// Back to the state before the flow started
    #[default]
    Recover = 0,
    /// Keep the last flow state
    Stay = 1,
    TurnOff = 2,
}

/// Sequence of flow steps, optionally repeated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColorFlow {
    pub expressions: Vec<FlowExpression>,
    /// 0 repeats forever
    pub repetitions: u32,
    pub end_action: FlowEndAction,
}

impl ColorFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rgb(mut self, color: Rgb, brightness: i32, duration: Duration) -> Self {
        self.expressions.push(FlowExpression::Color {
            color,
            brightness,
            duration,
        });
        self
    }

    pub fn temperature(mut self, kelvin: u32, brightness: i32, duration: Duration) -> Self {
        self.expressions.push(FlowExpression::Temperature {
            kelvin,
            brightness,
            duration,
        });
        self
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.expressions.push(FlowExpression::Sleep { duration });
        self
    }

    pub fn repeat(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    pub fn end_action(mut self, action: FlowEndAction) -> Self {
        self.end_action = action;
        self
    }

    /// Number of state changes the device runs; 0 means infinite.
    pub fn count(&self) -> u32 {
        self.repetitions.saturating_mul(self.expressions.len() as u32)
    }

    /// Comma-joined flow tuples.
    pub fn expression(&self) -> String {
        self.expressions
            .iter()
            .flat_map(|e| e.tuple())
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn params(&self) -> Vec<Value> {
        vec![
            json!(self.count()),
            json!(self.end_action as i32),
            json!(self.expression()),
        ]
    }
}

/// State applied directly, whatever the light is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scene {
    Color { color: Rgb, brightness: u8 },
    Hsv { hue: u16, sat: u8, brightness: u8 },
    Ct { kelvin: u32, brightness: u8 },
    Flow(ColorFlow),
    /// Turns on at `brightness` and off after `minutes`
    AutoDelayOff { brightness: u8, minutes: u32 },
}

impl Scene {
    fn params(&self) -> Vec<Value> {
        match self {
            Scene::Color { color, brightness } => {
                vec![json!("color"), json!(color.packed()), json!(brightness)]
            }
            Scene::Hsv {
                hue,
                sat,
                brightness,
            } => vec![json!("hsv"), json!(hue), json!(sat), json!(brightness)],
            Scene::Ct { kelvin, brightness } => {
                vec![json!("ct"), json!(kelvin), json!(brightness)]
            }
            Scene::Flow(flow) => {
                let mut params = vec![json!("cf")];
                params.extend(flow.params());
                params
            }
            Scene::AutoDelayOff {
                brightness,
                minutes,
            } => vec![json!("auto_delay_off"), json!(brightness), json!(minutes)],
        }
    }
}

/// Entry returned by `cron_get`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CronEntry {
    #[serde(rename = "type")]
    pub kind: i64,
    pub delay: i64,
    #[serde(default)]
    pub mix: i64,
}

const CRON_POWER_OFF: i64 = 0;
const MUSIC_OFF: i64 = 0;
const MUSIC_ON: i64 = 1;

fn clamp_percent(percent: i32) -> i32 {
    percent.clamp(-100, 100)
}

fn adjust_duration(duration: Duration) -> u64 {
    (duration.as_millis() as u64).max(MIN_SMOOTH_MS)
}

fn is_ok(result: &[Value]) -> bool {
    result.first().and_then(Value::as_str) == Some(RESULT_OK)
}

fn with_transition(mut params: Vec<Value>, transition: Transition) -> Vec<Value> {
    params.extend(transition.params());
    params
}

// -------------------------------------------------------------------------
// Device Control API
// -------------------------------------------------------------------------
impl Device {
    async fn command(&self, method: Method, params: Vec<Value>) -> Result<bool> {
        let result: Vec<Value> = self.execute_with_response(method, params).await?;
        Ok(is_ok(&result))
    }

    pub async fn set_power(
        &self,
        on: bool,
        transition: Transition,
        mode: PowerOnMode,
    ) -> Result<bool> {
        self.command(Method::SetPower, power_params(on, transition, mode)).await
    }

    pub async fn turn_on(&self, transition: Transition) -> Result<bool> {
        self.set_power(true, transition, PowerOnMode::Normal).await
    }

    pub async fn turn_off(&self, transition: Transition) -> Result<bool> {
        self.command(Method::SetPower, with_transition(vec![json!("off")], transition)).await
    }

    pub async fn toggle(&self) -> Result<bool> {
        self.command(Method::Toggle, Vec::new()).await
    }

    /// Toggles main and background light together.
    pub async fn dev_toggle(&self) -> Result<bool> {
        self.command(Method::DevToggle, Vec::new()).await
    }

    /// Brightness in percent (1 ~ 100).
    pub async fn set_brightness(&self, value: u8, transition: Transition) -> Result<bool> {
        self.command(
            Method::SetBrightness,
            with_transition(vec![json!(value)], transition),
        )
        .await
    }

    /// Color temperature in Kelvin (1700 ~ 6500).
    pub async fn set_color_temperature(&self, kelvin: u32, transition: Transition) -> Result<bool> {
        self.command(
            Method::SetColorTemperature,
            with_transition(vec![json!(kelvin)], transition),
        )
        .await
    }

    pub async fn set_rgb_color(&self, color: Rgb, transition: Transition) -> Result<bool> {
        self.command(
            Method::SetRgbColor,
            with_transition(vec![json!(color.packed())], transition),
        )
        .await
    }

    pub async fn set_hsv_color(&self, hue: u16, sat: u8, transition: Transition) -> Result<bool> {
        self.command(
            Method::SetHsvColor,
            with_transition(vec![json!(hue), json!(sat)], transition),
        )
        .await
    }

    /// Relative brightness change; `percent` is clamped to -100 ~ 100.
    pub async fn adjust_brightness(&self, percent: i32, duration: Duration) -> Result<bool> {
        self.command(Method::AdjustBright, adjust_params(percent, duration)).await
    }

    pub async fn adjust_color_temperature(&self, percent: i32, duration: Duration) -> Result<bool> {
        self.command(Method::AdjustColorTemperature, adjust_params(percent, duration)).await
    }

    pub async fn adjust_color(&self, percent: i32, duration: Duration) -> Result<bool> {
        self.command(Method::AdjustColor, adjust_params(percent, duration)).await
    }

    pub async fn set_adjust(&self, action: AdjustAction, property: AdjustProperty) -> Result<bool> {
        self.command(
            Method::SetAdjust,
            vec![json!(action.as_str()), json!(property.as_str())],
        )
        .await
    }

    /// Saves the current state as power-on default.
    pub async fn set_default(&self) -> Result<bool> {
        self.command(Method::SetDefault, Vec::new()).await
    }

    /// Renames the device. The stored `name` property follows on success.
    pub async fn set_name(&self, name: &str) -> Result<bool> {
        let ok = self.command(Method::SetName, vec![json!(name)]).await?;
        if ok {
            self.store().set(Property::Name, json!(name));
        }
        Ok(ok)
    }

    pub async fn start_color_flow(&self, flow: &ColorFlow) -> Result<bool> {
        self.command(Method::StartColorFlow, flow.params()).await
    }

    pub async fn stop_color_flow(&self) -> Result<bool> {
        self.command(Method::StopColorFlow, Vec::new()).await
    }

    pub async fn set_scene(&self, scene: &Scene) -> Result<bool> {
        self.command(Method::SetScene, scene.params()).await
    }

    /// Schedules a power-off after `minutes`.
    pub async fn cron_add(&self, minutes: u32) -> Result<bool> {
        self.command(Method::AddCron, vec![json!(CRON_POWER_OFF), json!(minutes)]).await
    }

    pub async fn cron_get(&self) -> Result<Vec<CronEntry>> {
        self.execute_with_response(Method::GetCron, vec![json!(CRON_POWER_OFF)]).await
    }

    pub async fn cron_delete(&self) -> Result<bool> {
        self.command(Method::DeleteCron, vec![json!(CRON_POWER_OFF)]).await
    }

    /// Asks the device to connect back to `host:port` for music mode.
    pub async fn start_music_mode(&self, host: &str, port: u16) -> Result<bool> {
        self.command(
            Method::SetMusicMode,
            vec![json!(MUSIC_ON), json!(host), json!(port)],
        )
        .await
    }

    pub async fn stop_music_mode(&self) -> Result<bool> {
        self.command(Method::SetMusicMode, vec![json!(MUSIC_OFF)]).await
    }
}

// -------------------------------------------------------------------------
// Background Light Control API
// -------------------------------------------------------------------------
impl Device {
    pub async fn bg_set_power(
        &self,
        on: bool,
        transition: Transition,
        mode: PowerOnMode,
    ) -> Result<bool> {
        self.command(
            Method::BackgroundSetPower,
            power_params(on, transition, mode),
        )
        .await
    }

    pub async fn bg_turn_on(&self, transition: Transition) -> Result<bool> {
        self.bg_set_power(true, transition, PowerOnMode::Normal).await
    }

    pub async fn bg_turn_off(&self, transition: Transition) -> Result<bool> {
        self.command(
            Method::BackgroundSetPower,
            with_transition(vec![json!("off")], transition),
        )
        .await
    }

    pub async fn bg_toggle(&self) -> Result<bool> {
        self.command(Method::BackgroundToggle, Vec::new()).await
    }

    pub async fn bg_set_brightness(&self, value: u8, transition: Transition) -> Result<bool> {
        self.command(
            Method::BackgroundSetBrightness,
            with_transition(vec![json!(value)], transition),
        )
        .await
    }

    pub async fn bg_set_color_temperature(
        &self,
        kelvin: u32,
        transition: Transition,
    ) -> Result<bool> {
        self.command(
            Method::BackgroundSetColorTemperature,
            with_transition(vec![json!(kelvin)], transition),
        )
        .await
    }

    pub async fn bg_set_rgb_color(&self, color: Rgb, transition: Transition) -> Result<bool> {
        self.command(
            Method::BackgroundSetRgbColor,
            with_transition(vec![json!(color.packed())], transition),
        )
        .await
    }

    pub async fn bg_set_hsv_color(
        &self,
        hue: u16,
        sat: u8,
        transition: Transition,
    ) -> Result<bool> {
        self.command(
            Method::BackgroundSetHsvColor,
            with_transition(vec![json!(hue), json!(sat)], transition),
        )
        .await
    }

    pub async fn bg_adjust_brightness(&self, percent: i32, duration: Duration) -> Result<bool> {
        self.command(Method::BackgroundAdjustBright, adjust_params(percent, duration)).await
    }

    pub async fn bg_adjust_color_temperature(
        &self,
        percent: i32,
        duration: Duration,
    ) -> Result<bool> {
        self.command(
            Method::BackgroundAdjustColorTemperature,
            adjust_params(percent, duration),
        )
        .await
    }

    pub async fn bg_adjust_color(&self, percent: i32, duration: Duration) -> Result<bool> {
        self.command(Method::BackgroundAdjustColor, adjust_params(percent, duration)).await
    }

    pub async fn bg_set_adjust(
        &self,
        action: AdjustAction,
        property: AdjustProperty,
    ) -> Result<bool> {
        self.command(
            Method::BackgroundSetAdjust,
            vec![json!(action.as_str()), json!(property.as_str())],
        )
        .await
    }

    pub async fn bg_set_default(&self) -> Result<bool> {
        self.command(Method::BackgroundSetDefault, Vec::new()).await
    }

    pub async fn bg_start_color_flow(&self, flow: &ColorFlow) -> Result<bool> {
        self.command(Method::BackgroundStartColorFlow, flow.params()).await
    }

    pub async fn bg_stop_color_flow(&self) -> Result<bool> {
        self.command(Method::BackgroundStopColorFlow, Vec::new()).await
    }

    pub async fn bg_set_scene(&self, scene: &Scene) -> Result<bool> {
        self.command(Method::BackgroundSetScene, scene.params()).await
    }
}

fn power_params(on: bool, transition: Transition, mode: PowerOnMode) -> Vec<Value> {
    let state = if on { "on" } else { "off" };
    let mut params = with_transition(vec![json!(state)], transition);
    params.push(json!(mode as i32));
    params
}

fn adjust_params(percent: i32, duration: Duration) -> Vec<Value> {
    vec![json!(clamp_percent(percent)), json!(adjust_duration(duration))]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_encode_as_two_params() {
        assert_eq!(
            Transition::Sudden.params(),
            [json!("sudden"), json!(0)]
        );
        assert_eq!(
            Transition::smooth_ms(500).params(),
            [json!("smooth"), json!(500)]
        );
        assert_eq!(
            Transition::smooth_ms(5).params(),
            [json!("smooth"), json!(30)]
        );
    }

    #[test]
    fn power_params_carry_the_mode() {
        assert_eq!(
            power_params(true, Transition::smooth_ms(300), PowerOnMode::Rgb),
            vec![json!("on"), json!("smooth"), json!(300), json!(2)]
        );
    }

    #[test]
    fn percentages_are_clamped() {
        assert_eq!(adjust_params(250, Duration::from_millis(10)), vec![json!(100), json!(30)]);
        assert_eq!(adjust_params(-150, Duration::from_millis(500)), vec![json!(-100), json!(500)]);
        assert_eq!(adjust_params(-20, Duration::ZERO), vec![json!(-20), json!(30)]);
    }

    #[test]
    fn rgb_packs_into_24_bits() {
        let c = Rgb::new(0x12, 0x34, 0x56);
        assert_eq!(c.packed(), 0x123456);
        assert_eq!(Rgb::from_packed(0x123456), c);
        assert_eq!(Rgb::new(255, 255, 255).packed(), 16_777_215);
    }

    #[test]
    fn color_flow_expression() {
        let flow = ColorFlow::new().rgb(Rgb::new(255, 0, 0), 100, Duration::from_millis(1000))
            .temperature(2700, 50, Duration::from_millis(10))
            .sleep(Duration::from_millis(500))
            .repeat(2)
            .end_action(FlowEndAction::TurnOff);

        assert_eq!(flow.count(), 6);
        assert_eq!(
            flow.expression(),
            "1000,1,16711680,100,50,2,2700,50,500,7,0,0"
        );
        assert_eq!(
            flow.params(),
            vec![json!(6), json!(2), json!(flow.expression())]
        );
    }

    #[test]
    fn scene_params() {
        assert_eq!(
            Scene::Ct {
                kelvin: 4000,
                brightness: 60
            }
            .params(),
            vec![json!("ct"), json!(4000), json!(60)]
        );
        assert_eq!(
            Scene::AutoDelayOff {
                brightness: 50,
                minutes: 5
            }
            .params(),
            vec![json!("auto_delay_off"), json!(50), json!(5)]
        );

        let flow = ColorFlow::new().sleep(Duration::from_millis(100));
        let params = Scene::Flow(flow).params();
        assert_eq!(params[0], json!("cf"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn ok_detection() {
        assert!(is_ok(&[json!("ok")]));
        assert!(!is_ok(&[]));
        assert!(!is_ok(&[json!("error")]));
    }
}
