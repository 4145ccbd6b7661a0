use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CommandError;

/// Start recording on a camera.
pub const RECORD: &str = "record";
/// Stop recording on a camera.
pub const STOP_RECORD: &str = "stoprecord";
/// Start or stop the upload transfer.
pub const UPLOAD: &str = "upload";
/// Liveness probe.
pub const PING: &str = "ping";
/// Device status report.
pub const STATUS: &str = "status";

/// Fields never printed by `Debug`.
const SENSITIVE_FIELDS: &[&str] = &["password"];

/// An outbound JSON command: `{"command": name, ...fields}`.
#[derive(Clone, PartialEq)]
pub struct Command {
    name: String,
    fields: Map<String, Value>,
}

impl Command {
    /// Create a command with no extra fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Parse operator-supplied JSON. Must be an object with a string `command`.
    pub fn from_json(text: &str) -> Result<Self, CommandError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut fields) = value else {
            return Err(CommandError::InvalidCommand(
                "expected a JSON object".to_string(),
            ));
        };
        match fields.remove("command") {
            Some(Value::String(name)) if !name.is_empty() => Ok(Self { name, fields }),
            Some(_) => Err(CommandError::InvalidCommand(
                "\"command\" must be a non-empty string".to_string(),
            )),
            None => Err(CommandError::InvalidCommand(
                "missing \"command\" field".to_string(),
            )),
        }
    }

    /// The command name replies are matched against.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command-specific fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Serialize to the JSON body sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn ping() -> Self {
        Self::new(PING)
    }

    pub fn status() -> Self {
        Self::new(STATUS)
    }

    pub fn record(camera: u32) -> Self {
        Self::new(RECORD).with_field("camera", camera)
    }

    pub fn stop_record(camera: u32) -> Self {
        Self::new(STOP_RECORD).with_field("camera", camera)
    }

    /// Start (`true`) or stop (`false`) the in-car video upload.
    pub fn upload(icv: bool) -> Self {
        Self::new(UPLOAD).with_field("icv", icv)
    }

    /// Initialise the recording memory pool, in megabytes.
    pub fn init_pool(size_mb: u32) -> Self {
        Self::new("initpool").with_field("size", size_mb)
    }

    pub fn record_init_camera(init: &CameraInit) -> Self {
        let mut command = Self::new("recordinitcam");
        if let Ok(Value::Object(fields)) = serde_json::to_value(init) {
            command.fields = fields;
        }
        command
    }

    pub fn login(officer: &str, password: &str, partner: &str, unit: &str) -> Self {
        Self::new("login")
            .with_field("officer", officer)
            .with_field("password", password)
            .with_field("partner", partner)
            .with_field("unit", unit)
    }

    pub fn preview(camera: u32) -> Self {
        Self::new("preview").with_field("camera", camera)
    }

    pub fn stop_preview(camera: u32) -> Self {
        Self::new("stoppreview").with_field("camera", camera)
    }

    pub fn server_start() -> Self {
        Self::new("serverstart")
    }

    pub fn server_stop() -> Self {
        Self::new("serverstop")
    }

    pub fn live_stream(camera: u32, on: bool) -> Self {
        Self::new("livestream")
            .with_field("camera", camera)
            .with_field("on", on)
    }

    pub fn stream_start_file(filename: &str) -> Self {
        Self::new("streamstartfile").with_field("filename", filename)
    }

    pub fn stream_stop_file() -> Self {
        Self::new("streamstopfile")
    }

    pub fn bookmark(camera: u32) -> Self {
        Self::new("bookmark").with_field("camera", camera)
    }

    pub fn snapshot(camera: u32, filename: &str) -> Self {
        Self::new("snapshot")
            .with_field("camera", camera)
            .with_field("filename", filename)
    }

    pub fn file_info(filename: &str) -> Self {
        Self::new("getinfo").with_field("filename", filename)
    }

    /// Request a file; the contents follow as binary chunks, which this
    /// client does not collect.
    pub fn read_file(filename: &str) -> Self {
        Self::new("readfile").with_field("filename", filename)
    }

    pub fn list_dir(path: &str, filters: &[&str]) -> Self {
        Self::new("ls")
            .with_field("path", path)
            .with_field("filters", filters.to_vec())
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("command", &self.name)?;
        for (key, value) in &self.fields {
            if key != "command" {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Command");
        dbg.field("name", &self.name);
        for (key, value) in &self.fields {
            if SENSITIVE_FIELDS.contains(&key.as_str()) {
                dbg.field(key, &format_args!("<redacted>"));
            } else {
                dbg.field(key, value);
            }
        }
        dbg.finish()
    }
}

/// Encoder settings for `recordinitcam`. Defaults are the device's
/// standard 1080p30 profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInit {
    pub camera: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub gop: u32,
    pub controlrate: u32,
    pub bitrate: u32,
    pub quality: u32,
    pub buffersize: u32,
    pub audioid: u32,
}

impl Default for CameraInit {
    fn default() -> Self {
        Self {
            camera: 0,
            width: 1920,
            height: 1080,
            fps: 30,
            gop: 30,
            controlrate: 2,
            bitrate: 6_000_000,
            quality: 1,
            buffersize: 90,
            audioid: 0,
        }
    }
}

/// An inbound JSON reply: `{"command": name, "status": n, ...}`.
///
/// The device omits `command` when it cannot parse the request; such a
/// reply has an empty name and never matches a pending command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub command: String,
    pub status: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Status 0 means success.
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    /// Whether this reply answers `command`.
    pub fn answers(&self, command: &str) -> bool {
        self.command == command
    }
}
