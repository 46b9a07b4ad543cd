//! Remote channel messages (port 6466).

use super::keys::{KeyCode, KeyDirection};
use super::wire::{for_each_field, Value, Writer};
use crate::error::{Error, Result};

/// Configure code the client answers with.
pub const CLIENT_CONFIGURE_CODE: i32 = 622;

/// Active value the client answers a set-active request with.
pub const CLIENT_ACTIVE_CODE: i32 = 622;

mod field {
    pub const CONFIGURE: u32 = 1;
    pub const SET_ACTIVE: u32 = 2;
    pub const ERROR: u32 = 3;
    pub const PING_REQUEST: u32 = 8;
    pub const PING_RESPONSE: u32 = 9;
    pub const KEY_INJECT: u32 = 10;
    pub const IME_KEY_INJECT: u32 = 20;
    pub const IME_BATCH_EDIT: u32 = 21;
    pub const IME_SHOW_REQUEST: u32 = 22;
    pub const START: u32 = 40;
    pub const APP_LINK_LAUNCH: u32 = 90;
}

/// Device description exchanged during configure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Model name
    pub model: String,
    /// Vendor name
    pub vendor: String,
    /// Protocol constant, 1 for clients
    pub unknown1: i32,
    /// Protocol constant, "1" for clients
    pub unknown2: String,
    /// Package name of the remote app
    pub package_name: String,
    /// App version
    pub app_version: String,
}

impl DeviceInfo {
    /// Device info this client announces.
    #[must_use]
    pub fn client(model: &str) -> Self {
        Self {
            model: model.to_string(),
            vendor: "tvlink".to_string(),
            unknown1: 1,
            unknown2: "1".to_string(),
            package_name: "tvlink".to_string(),
            app_version: crate::VERSION.to_string(),
        }
    }

    fn encode(&self) -> Writer {
        Writer::new()
            .string(1, &self.model)
            .string(2, &self.vendor)
            .int(3, i64::from(self.unknown1))
            .string(4, &self.unknown2)
            .string(5, &self.package_name)
            .string(6, &self.app_version)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut info = Self::default();
        for_each_field(bytes, |field, value| {
            match field {
                1 => info.model = value.as_string(),
                2 => info.vendor = value.as_string(),
                3 => info.unknown1 = value.as_i32(),
                4 => info.unknown2 = value.as_string(),
                5 => info.package_name = value.as_string(),
                6 => info.app_version = value.as_string(),
                _ => {}
            }
            Ok(())
        })?;
        Ok(info)
    }
}

/// Selection and content of the TV's input field inside an IME edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextFieldStatus {
    /// Selection start
    pub start: i32,
    /// Selection end
    pub end: i32,
    /// Field content
    pub value: String,
}

impl TextFieldStatus {
    fn encode(&self) -> Writer {
        Writer::new()
            .int(1, i64::from(self.start))
            .int(2, i64::from(self.end))
            .string(3, &self.value)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut status = Self::default();
        for_each_field(bytes, |field, value| {
            match field {
                1 => status.start = value.as_i32(),
                2 => status.end = value.as_i32(),
                3 => status.value = value.as_string(),
                _ => {}
            }
            Ok(())
        })?;
        Ok(status)
    }
}

/// An IME batch edit: edit counters plus the resulting field state.
///
/// Inbound it reports the TV's field; outbound it replaces the selected range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImeEdit {
    /// IME counter the edit applies to
    pub ime_counter: i32,
    /// Field counter the edit applies to
    pub field_counter: i32,
    /// Field state, absent in counter-only updates
    pub status: Option<TextFieldStatus>,
}

impl ImeEdit {
    /// Edit replacing `[start, end)` with `value`.
    #[must_use]
    pub fn replace(
        ime_counter: i32,
        field_counter: i32,
        start: i32,
        end: i32,
        value: &str,
    ) -> Self {
        Self {
            ime_counter,
            field_counter,
            status: Some(TextFieldStatus {
                start,
                end,
                value: value.to_string(),
            }),
        }
    }

    /// Text carried by the edit, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.value.as_str())
    }

    fn encode(&self) -> Writer {
        let mut writer = Writer::new()
            .int(1, i64::from(self.ime_counter))
            .int(2, i64::from(self.field_counter));
        if let Some(status) = &self.status {
            writer = writer.message(3, Writer::new().int(1, 1).message(2, status.encode()));
        }
        writer
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut edit = Self::default();
        for_each_field(bytes, |field, value| {
            match field {
                1 => edit.ime_counter = value.as_i32(),
                2 => edit.field_counter = value.as_i32(),
                // repeated edit info, the last one with a field state wins
                3 => for_each_field(value.as_bytes(), |inner, inner_value| {
                    if inner == 2 {
                        edit.status = Some(TextFieldStatus::decode(inner_value.as_bytes())?);
                    }
                    Ok(())
                })?,
                _ => {}
            }
            Ok(())
        })?;
        Ok(edit)
    }
}

/// Input field the TV focused, announced before any batch edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImeField {
    /// Field counter for subsequent edits
    pub field_counter: i32,
    /// Current content
    pub value: String,
    /// Field label (hint text)
    pub label: String,
}

impl ImeField {
    fn encode(&self) -> Writer {
        Writer::new()
            .int(1, i64::from(self.field_counter))
            .string(2, &self.value)
            .string(6, &self.label)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut status = Self::default();
        for_each_field(bytes, |field, value| {
            match field {
                1 => status.field_counter = value.as_i32(),
                2 => status.value = value.as_string(),
                6 => status.label = value.as_string(),
                _ => {}
            }
            Ok(())
        })?;
        Ok(status)
    }
}

/// A message on the remote channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteMessage {
    /// Configuration exchange, first message in both directions
    Configure {
        /// Feature code
        code1: i32,
        /// Sender description
        device_info: Option<DeviceInfo>,
    },
    /// TV asks the client to become active; the client echoes it
    SetActive {
        /// Active features
        active: i32,
    },
    /// TV reports an error for the last message
    Error {
        /// Error flag
        value: bool,
    },
    /// Keep-alive from the TV
    PingRequest {
        /// Value to echo
        val1: i32,
    },
    /// Keep-alive reply
    PingResponse {
        /// Echoed value
        val1: i32,
    },
    /// Key press
    KeyInject {
        /// Key
        key_code: KeyCode,
        /// Press direction
        direction: KeyDirection,
    },
    /// TV focused an input field
    ImeKeyInject {
        /// Foreground app package
        app_package: String,
        /// Focused field
        field: Option<ImeField>,
    },
    /// IME edit in either direction
    ImeBatchEdit(ImeEdit),
    /// TV shows its on-screen keyboard
    ImeShowRequest {
        /// Focused field
        field: Option<ImeField>,
    },
    /// TV power state
    Start {
        /// Whether the TV is on
        started: bool,
    },
    /// Open a deep link on the TV
    AppLinkLaunch {
        /// Link or package URI
        app_link: String,
    },
    /// Message type tvlink does not handle
    Unhandled(u32),
}

impl RemoteMessage {
    /// Name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Configure { .. } => "configure",
            Self::SetActive { .. } => "set_active",
            Self::Error { .. } => "error",
            Self::PingRequest { .. } => "ping_request",
            Self::PingResponse { .. } => "ping_response",
            Self::KeyInject { .. } => "key_inject",
            Self::ImeKeyInject { .. } => "ime_key_inject",
            Self::ImeBatchEdit(_) => "ime_batch_edit",
            Self::ImeShowRequest { .. } => "ime_show_request",
            Self::Start { .. } => "start",
            Self::AppLinkLaunch { .. } => "app_link_launch",
            Self::Unhandled(_) => "unhandled",
        }
    }

    /// Encode to protobuf bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let outer = Writer::new();
        let outer = match self {
            Self::Configure { code1, device_info } => {
                let mut inner = Writer::new().int(1, i64::from(*code1));
                if let Some(info) = device_info {
                    inner = inner.message(2, info.encode());
                }
                outer.message(field::CONFIGURE, inner)
            }
            Self::SetActive { active } => {
                outer.message(field::SET_ACTIVE, Writer::new().int(1, i64::from(*active)))
            }
            Self::Error { value } => outer.message(field::ERROR, Writer::new().bool(1, *value)),
            Self::PingRequest { val1 } => {
                outer.message(field::PING_REQUEST, Writer::new().int(1, i64::from(*val1)))
            }
            Self::PingResponse { val1 } => {
                outer.message(field::PING_RESPONSE, Writer::new().int(1, i64::from(*val1)))
            }
            Self::KeyInject {
                key_code,
                direction,
            } => outer.message(
                field::KEY_INJECT,
                Writer::new()
                    .int(1, i64::from(key_code.code()))
                    .int(2, direction.wire_value()),
            ),
            Self::ImeKeyInject { app_package, field } => {
                let mut inner =
                    Writer::new().message(1, Writer::new().string(12, app_package));
                if let Some(f) = field {
                    inner = inner.message(2, f.encode());
                }
                outer.message(field::IME_KEY_INJECT, inner)
            }
            Self::ImeBatchEdit(edit) => outer.message(field::IME_BATCH_EDIT, edit.encode()),
            Self::ImeShowRequest { field } => {
                let mut inner = Writer::new();
                if let Some(f) = field {
                    inner = inner.message(2, f.encode());
                }
                outer.message(field::IME_SHOW_REQUEST, inner)
            }
            Self::Start { started } => outer.message(field::START, Writer::new().bool(1, *started)),
            Self::AppLinkLaunch { app_link } => {
                outer.message(field::APP_LINK_LAUNCH, Writer::new().string(1, app_link))
            }
            Self::Unhandled(number) => outer.message(*number, Writer::new()),
        };
        outer.finish()
    }

    /// Decode from protobuf bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut message = None;
        for_each_field(bytes, |number, value| {
            if message.is_none() {
                message = Some(Self::decode_field(number, value)?);
            }
            Ok(())
        })?;
        message.ok_or_else(|| Error::ProtocolError("empty remote message".to_string()))
    }

    fn decode_field(number: u32, value: Value<'_>) -> Result<Self> {
        let bytes = value.as_bytes();
        let message = match number {
            field::CONFIGURE => {
                let mut code1 = 0;
                let mut device_info = None;
                for_each_field(bytes, |f, v| {
                    match f {
                        1 => code1 = v.as_i32(),
                        2 => device_info = Some(DeviceInfo::decode(v.as_bytes())?),
                        _ => {}
                    }
                    Ok(())
                })?;
                Self::Configure { code1, device_info }
            }
            field::SET_ACTIVE => Self::SetActive {
                active: first_int(bytes, 1)?,
            },
            field::ERROR => Self::Error {
                value: first_int(bytes, 1)? != 0,
            },
            field::PING_REQUEST => Self::PingRequest {
                val1: first_int(bytes, 1)?,
            },
            field::PING_RESPONSE => Self::PingResponse {
                val1: first_int(bytes, 1)?,
            },
            field::KEY_INJECT => {
                let code = first_int(bytes, 1)?;
                let direction = KeyDirection::from_wire(first_int(bytes, 2)?)
                    .unwrap_or_default();
                Self::KeyInject {
                    key_code: KeyCode(u32::try_from(code).unwrap_or_default()),
                    direction,
                }
            }
            field::IME_KEY_INJECT => {
                let mut app_package = String::new();
                let mut ime_field = None;
                for_each_field(bytes, |f, v| {
                    match f {
                        1 => for_each_field(v.as_bytes(), |app_f, app_v| {
                            if app_f == 12 {
                                app_package = app_v.as_string();
                            }
                            Ok(())
                        })?,
                        2 => ime_field = Some(ImeField::decode(v.as_bytes())?),
                        _ => {}
                    }
                    Ok(())
                })?;
                Self::ImeKeyInject {
                    app_package,
                    field: ime_field,
                }
            }
            field::IME_BATCH_EDIT => Self::ImeBatchEdit(ImeEdit::decode(bytes)?),
            field::IME_SHOW_REQUEST => {
                let mut ime_field = None;
                for_each_field(bytes, |f, v| {
                    if f == 2 {
                        ime_field = Some(ImeField::decode(v.as_bytes())?);
                    }
                    Ok(())
                })?;
                Self::ImeShowRequest { field: ime_field }
            }
            field::START => Self::Start {
                started: first_int(bytes, 1)? != 0,
            },
            field::APP_LINK_LAUNCH => {
                let mut app_link = String::new();
                for_each_field(bytes, |f, v| {
                    if f == 1 {
                        app_link = v.as_string();
                    }
                    Ok(())
                })?;
                Self::AppLinkLaunch { app_link }
            }
            other => Self::Unhandled(other),
        };
        Ok(message)
    }
}

fn first_int(bytes: &[u8], wanted: u32) -> Result<i32> {
    let mut found = 0;
    for_each_field(bytes, |f, v| {
        if f == wanted {
            found = v.as_i32();
        }
        Ok(())
    })?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_inject_known_bytes() {
        let msg = RemoteMessage::KeyInject {
            key_code: KeyCode::HOME,
            direction: KeyDirection::Short,
        };
        // field 10, len 4, {1: 3, 2: 3}
        assert_eq!(msg.encode(), vec![0x52, 0x04, 0x08, 0x03, 0x10, 0x03]);
    }

    #[test]
    fn test_ime_batch_edit_decode() {
        let edit = ImeEdit::replace(3, 1, 0, 3, "HEL");
        let decoded = RemoteMessage::decode(&RemoteMessage::ImeBatchEdit(edit.clone()).encode())
            .unwrap();
        assert_eq!(decoded, RemoteMessage::ImeBatchEdit(edit));
    }

    #[test]
    fn test_counter_only_batch_edit() {
        let bytes = Writer::new()
            .message(field::IME_BATCH_EDIT, Writer::new().int(1, 9).int(2, 4))
            .finish();
        match RemoteMessage::decode(&bytes).unwrap() {
            RemoteMessage::ImeBatchEdit(edit) => {
                assert_eq!((edit.ime_counter, edit.field_counter), (9, 4));
                assert!(edit.text().is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_configure_with_device_info() {
        let msg = RemoteMessage::Configure {
            code1: CLIENT_CONFIGURE_CODE,
            device_info: Some(DeviceInfo::client("desk")),
        };
        let decoded = RemoteMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_show_request_field() {
        let msg = RemoteMessage::ImeShowRequest {
            field: Some(ImeField {
                field_counter: 5,
                value: "abc".to_string(),
                label: "Search".to_string(),
            }),
        };
        assert_eq!(RemoteMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_unknown_message_is_unhandled() {
        let bytes = Writer::new().message(50, Writer::new().int(1, 10)).finish();
        assert_eq!(
            RemoteMessage::decode(&bytes).unwrap(),
            RemoteMessage::Unhandled(50)
        );
    }

    #[test]
    fn test_empty_message_is_error() {
        assert!(RemoteMessage::decode(&[]).is_err());
    }
}
