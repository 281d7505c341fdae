//! Yeelight wire protocol implementation.
//! Handles line framing, command encoding, inbound decoding and the static name tables.

use crate::error::{Result, YeelightError};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Default TCP control port of a device.
pub const DEFAULT_PORT: u16 = 55443;
/// Every message on the control socket ends with this sequence.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Upper bound for a partial line kept across reads.
const MAX_PENDING_LINE: usize = 64 * 1024;

const KEY_ID: &str = "id";

define_wire_enum! {
    /// Methods understood by Yeelight devices.
    pub enum Method {
        GetProp = "get_prop",
        SetColorTemperature = "set_ct_abx",
        SetRgbColor = "set_rgb",
        SetHsvColor = "set_hsv",
        SetBrightness = "set_bright",
        SetPower = "set_power",
        Toggle = "toggle",
        SetDefault = "set_default",
        StartColorFlow = "start_cf",
        StopColorFlow = "stop_cf",
        SetScene = "set_scene",
        AddCron = "cron_add",
        GetCron = "cron_get",
        DeleteCron = "cron_del",
        SetAdjust = "set_adjust",
        SetMusicMode = "set_music",
        SetName = "set_name",
        BackgroundSetRgbColor = "bg_set_rgb",
        BackgroundSetHsvColor = "bg_set_hsv",
        BackgroundSetColorTemperature = "bg_set_ct_abx",
        BackgroundStartColorFlow = "bg_start_cf",
        BackgroundStopColorFlow = "bg_stop_cf",
        BackgroundSetScene = "bg_set_scene",
        BackgroundSetDefault = "bg_set_default",
        BackgroundSetPower = "bg_set_power",
        BackgroundSetBrightness = "bg_set_bright",
        BackgroundSetAdjust = "bg_set_adjust",
        BackgroundToggle = "bg_toggle",
        DevToggle = "dev_toggle",
        AdjustBright = "adjust_bright",
        AdjustColorTemperature = "adjust_ct",
        AdjustColor = "adjust_color",
        BackgroundAdjustBright = "bg_adjust_bright",
        BackgroundAdjustColorTemperature = "bg_adjust_ct",
        BackgroundAdjustColor = "bg_adjust_color",
    }
}

define_wire_enum! {
    /// Device properties, as reported by `get_prop` and `props` notifications.
    pub enum Property {
        /// `on` / `off`
        Power = "power",
        /// Brightness percentage, 1 ~ 100
        Bright = "bright",
        /// Color temperature, 1700 ~ 6500 K
        Ct = "ct",
        /// Color, 1 ~ 16777215
        Rgb = "rgb",
        /// Hue, 0 ~ 359
        Hue = "hue",
        /// Saturation, 0 ~ 100
        Sat = "sat",
        /// 1: rgb, 2: color temperature, 3: hsv
        ColorMode = "color_mode",
        /// 1 while a color flow is running
        Flowing = "flowing",
        /// Remaining minutes of the sleep timer
        DelayOff = "delayoff",
        FlowParams = "flow_params",
        MusicOn = "music_on",
        Name = "name",
        BgPower = "bg_power",
        BgFlowing = "bg_flowing",
        BgFlowParams = "bg_flow_params",
        BgCt = "bg_ct",
        BgLMode = "bg_lmode",
        BgBright = "bg_bright",
        BgRgb = "bg_rgb",
        BgHue = "bg_hue",
        BgSat = "bg_sat",
        /// Brightness of the night mode light
        NlBr = "nl_br",
        /// 0: daylight, 1: moonlight (ceiling lights)
        ActiveMode = "active_mode",
    }
}

define_wire_enum! {
    /// Device model tags announced during discovery.
    pub enum Model {
        Unknown = "unknown",
        MonoBulb = "mono",
        MonoBulb1 = "mono1",
        ColorBulb = "color",
        ColorBulb1 = "color1",
        ColorBulb4 = "color4",
        Stripe = "stripe",
        Strip1 = "strip1",
        Ceiling = "ceiling",
        Ceiling1 = "ceiling1",
        Ceiling3 = "ceiling3",
        Ceiling4 = "ceiling4",
        Ceiling13 = "ceiling13",
        BedsideLamp = "bslamp",
        BedsideLamp1 = "bslamp1",
        DeskLamp = "desklamp",
        Lamp1 = "lamp1",
        Ceila = "ceila",
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Unknown
    }
}

impl Model {
    /// Maps an announced model name, falling back to [`Model::Unknown`].
    pub fn from_announced(name: &str) -> Self {
        Self::from_wire(name).unwrap_or_default()
    }
}

/// Outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Request id, never zero
    pub id: u32,
    pub method: Method,
    /// Ordered, heterogeneous parameters
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Command {
    pub fn new(id: u32, method: Method, params: Vec<Value>) -> Self {
        Self { id, method, params }
    }
}

/// Error object attached to a failed command result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Reply correlated to a command by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl CommandResult {
    pub fn ok(id: u32, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(id: u32, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }

    /// Splits the reply into its payload or the device-reported error.
    pub fn into_outcome(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(YeelightError::Protocol {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Unsolicited state-change message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: Map<String, Value>,
}

impl Notification {
    /// Parameters whose key is a known device property.
    pub fn properties(&self) -> impl Iterator<Item = (Property, &Value)> {
        self.params
            .iter()
            .filter_map(|(k, v)| Property::from_wire(k).map(|p| (p, v)))
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Result(CommandResult),
    Notification(Notification),
}

/// Encodes a command as one JSON line, terminator included.
pub fn encode(command: &Command) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec(command).map_err(|e| YeelightError::Encode(e.to_string()))?;
    bytes.extend_from_slice(LINE_TERMINATOR.as_bytes());
    Ok(bytes)
}

/// Decodes one inbound line.
///
/// A non-zero numeric `id` marks a command result; an absent, null or zero id
/// marks a notification, which must then carry a `method`.
pub fn decode_line(line: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(line.trim())?;
    let id = match value.as_object() {
        Some(obj) => match obj.get(KEY_ID) {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| YeelightError::Decode(format!("invalid id: {}", v)))?,
        },
        None => {
            return Err(YeelightError::Decode(format!(
                "expected a JSON object, got: {}",
                line.trim()
            )));
        }
    };

    if id != 0 {
        let result: CommandResult = serde_json::from_value(value)?;
        Ok(Inbound::Result(result))
    } else {
        let notification: Notification = serde_json::from_value(value)?;
        Ok(Inbound::Notification(notification))
    }
}

/// Parses an outbound command line (the inverse of [`encode`]).
pub fn decode_command(line: &str) -> Result<Command> {
    let command: Command = serde_json::from_str(line.trim())?;
    if command.id == 0 {
        return Err(YeelightError::Decode("command id must not be zero".into()));
    }
    Ok(command)
}

/// Splits a byte stream into lines, keeping a partial line across reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes and returns every complete, non-blank line.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        if self.pending.len() > MAX_PENDING_LINE {
            warn!(
                "Discarding {} bytes of unterminated inbound data",
                self.pending.len()
            );
            self.pending.clear();
        }
        lines
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Bytes of the current incomplete line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_appends_terminator() {
        let cmd = Command::new(1, Method::SetPower, vec![json!("on"), json!("smooth"), json!(500)]);
        let bytes = encode(&cmd).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.ends_with("\r\n"));
        assert_eq!(text.matches("\r\n").count(), 1);
        let value: Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(
            value,
            json!({"id": 1, "method": "set_power", "params": ["on", "smooth", 500]})
        );
    }

    #[test]
    fn command_survives_encode_then_decode() {
        let cmd = Command::new(
            42,
            Method::StartColorFlow,
            vec![json!(4), json!(0), json!("1000,2,2700,100,500,1,255,10")],
        );
        let line = String::from_utf8(encode(&cmd).unwrap()).unwrap();

        assert_eq!(decode_command(&line).unwrap(), cmd);
    }

    #[test]
    fn decodes_success_result() {
        let inbound = decode_line(r#"{"id":3,"result":["ok"]}"#).unwrap();
        match inbound {
            Inbound::Result(r) => {
                assert_eq!(r.id, 3);
                assert_eq!(r.into_outcome().unwrap(), json!(["ok"]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decodes_error_result() {
        let inbound =
            decode_line(r#"{"id":7,"error":{"code":-1,"message":"unsupported method"}}"#).unwrap();
        let Inbound::Result(r) = inbound else {
            panic!("expected a result");
        };
        let err = r.into_outcome().unwrap_err();
        assert_eq!(err.protocol_error(), Some((-1, "unsupported method")));
    }

    #[test]
    fn decodes_notification_without_id() {
        let inbound = decode_line(r#"{"method":"props","params":{"power":"on","bright":"10"}}"#)
            .unwrap();
        let Inbound::Notification(n) = inbound else {
            panic!("expected a notification");
        };
        assert_eq!(n.method, "props");
        let props: Vec<_> = n.properties().map(|(p, _)| p).collect();
        assert!(props.contains(&Property::Power));
        assert!(props.contains(&Property::Bright));
    }

    #[test]
    fn zero_id_is_a_notification() {
        let inbound = decode_line(r#"{"id":0,"method":"props","params":null}"#).unwrap();
        let Inbound::Notification(n) = inbound else {
            panic!("expected a notification");
        };
        assert!(n.params.is_empty());
    }

    #[test]
    fn malformed_lines_are_decode_errors() {
        for line in [
            "not json",
            "[1,2,3]",
            r#"{"params":{"power":"on"}}"#,
            r#"{"id":"abc","result":[]}"#,
            r#"{"id":1,"error":{"message":"no code"}}"#,
        ] {
            match decode_line(line) {
                Err(YeelightError::Decode(_)) => {}
                other => panic!("{} decoded as {:?}", line, other),
            }
        }
    }

    #[test]
    fn unknown_notification_keys_are_filtered() {
        let n = Notification {
            method: "props".into(),
            params: json!({"power": "off", "bogus": 1}).as_object().unwrap().clone(),
        };
        let props: Vec<_> = n.properties().collect();
        assert_eq!(props, vec![(Property::Power, &json!("off"))]);
    }

    #[test]
    fn line_buffer_keeps_partial_lines() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"{\"id\":1,\"result\":[\"ok\"]}\r\n{\"id\":2,");
        assert_eq!(lines, vec![r#"{"id":1,"result":["ok"]}"#.to_string()]);
        assert!(buf.pending_len() > 0);

        let lines = buf.push(b"\"result\":[\"ok\"]}\r\n\r\n");
        assert_eq!(lines, vec![r#"{"id":2,"result":["ok"]}"#.to_string()]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn name_tables_map_both_ways() {
        for method in Method::ALL {
            assert_eq!(Method::from_wire(method.as_str()), Some(*method));
        }
        assert_eq!(Property::ALL.len(), 23);
        assert_eq!("bg_lmode".parse::<Property>().unwrap(), Property::BgLMode);
        assert!("nope".parse::<Method>().is_err());
        assert_eq!(Model::from_announced("color"), Model::ColorBulb);
        assert_eq!(Model::from_announced("toaster"), Model::Unknown);
    }
}
