//! Codec model: the compiled-in parameter tree, verb decode/dispatch and the
//! mutable converter/pin state.
//!
//! The modeled codec is a minimal Realtek-flavored duplex part: root node 0,
//! audio function group 1, then DAC 2 -> output pin 3 for playback and input
//! pin 5 -> ADC 4 for capture. Capability words are answered from a static
//! table; everything mutable (formats, stream tags, gains, pin controls,
//! power) lives on [`HdaCodec`] and only verb handlers touch it.

use tracing::{debug, warn};

use crate::stream::{decode_format, StreamDir, StreamError};
use crate::worker::WorkerHandle;

pub const NODE_ROOT: u8 = 0;
pub const NODE_AFG: u8 = 1;
pub const NODE_DAC: u8 = 2;
pub const NODE_PIN_OUT: u8 = 3;
pub const NODE_ADC: u8 = 4;
pub const NODE_PIN_IN: u8 = 5;
const NODE_COUNT: u8 = 6;

// GET_PARAMETER ids.
pub const PARAM_VENDOR_ID: u32 = 0x00;
pub const PARAM_REVISION_ID: u32 = 0x02;
pub const PARAM_SUB_NODE_COUNT: u32 = 0x04;
pub const PARAM_FUNCTION_GROUP_TYPE: u32 = 0x05;
pub const PARAM_AUDIO_WIDGET_CAP: u32 = 0x09;
pub const PARAM_PCM_SIZE_RATE: u32 = 0x0A;
pub const PARAM_STREAM_FORMATS: u32 = 0x0B;
pub const PARAM_PIN_CAP: u32 = 0x0C;
pub const PARAM_INPUT_AMP_CAP: u32 = 0x0D;
pub const PARAM_CONN_LIST_LEN: u32 = 0x0E;
pub const PARAM_POWER_STATES: u32 = 0x0F;
pub const PARAM_OUTPUT_AMP_CAP: u32 = 0x12;

// 4-bit verb ids (16-bit payload).
const VERB_SET_CONVERTER_FORMAT: u32 = 0x2;
const VERB_SET_AMP_GAIN_MUTE: u32 = 0x3;
const VERB_GET_CONVERTER_FORMAT: u32 = 0xA;
const VERB_GET_AMP_GAIN_MUTE: u32 = 0xB;

// 12-bit verb ids (8-bit payload).
const VERB_SET_POWER_STATE: u32 = 0x705;
const VERB_SET_CONV_STREAM_CHAN: u32 = 0x706;
const VERB_SET_PIN_WIDGET_CTRL: u32 = 0x707;
const VERB_GET_PARAMETER: u32 = 0xF00;
const VERB_GET_CONN_LIST_ENTRY: u32 = 0xF02;
const VERB_GET_POWER_STATE: u32 = 0xF05;
const VERB_GET_CONV_STREAM_CHAN: u32 = 0xF06;
const VERB_GET_PIN_WIDGET_CTRL: u32 = 0xF07;
const VERB_GET_PIN_SENSE: u32 = 0xF09;
const VERB_GET_CONFIG_DEFAULT: u32 = 0xF1C;
const VERB_GET_SUBSYSTEM_ID: u32 = 0xF20;

const CODEC_VENDOR_ID: u32 = 0x10EC_0662;
const CODEC_REVISION_ID: u32 = 0x0010_0101;
const CODEC_SUBSYSTEM_ID: u32 = 0x10EC_0662;
/// 8/16/24/32-bit samples at 44.1/48/88.2/96 kHz.
const CODEC_PCM_SIZE_RATE: u32 = 0x001B_01E0;
/// PCM only.
const CODEC_STREAM_FORMATS: u32 = 0x1;
/// Mute-capable, 74 steps of 1.5 dB, 0 dB offset at the top step.
const CODEC_AMP_CAP: u32 = 0x8003_4A4A;

// SET/GET_AMP_GAIN_MUTE payload fields.
const AMP_SEL_LEFT: u32 = 1 << 13;
const AMP_SEL_RIGHT: u32 = 1 << 12;
const AMP_VALUE_MASK: u32 = 0xFF;

// Pin widget control bits.
const PIN_CTRL_OUT_EN: u8 = 1 << 6;
const PIN_CTRL_IN_EN: u8 = 1 << 5;

/// Capability lookup for the fixed node tree. Unknown (node, parameter)
/// pairs read as zero, like reserved hardware parameters.
fn node_parameter(nid: u8, param: u32) -> u32 {
    match (nid, param) {
        (NODE_ROOT, PARAM_VENDOR_ID) => CODEC_VENDOR_ID,
        (NODE_ROOT, PARAM_REVISION_ID) => CODEC_REVISION_ID,
        (NODE_ROOT, PARAM_SUB_NODE_COUNT) => (u32::from(NODE_AFG) << 16) | 1,

        (NODE_AFG, PARAM_SUB_NODE_COUNT) => (u32::from(NODE_DAC) << 16) | 4,
        (NODE_AFG, PARAM_FUNCTION_GROUP_TYPE) => 0x01,
        (NODE_AFG, PARAM_POWER_STATES) => 0xF,
        (NODE_AFG | NODE_DAC | NODE_ADC, PARAM_PCM_SIZE_RATE) => CODEC_PCM_SIZE_RATE,
        (NODE_AFG | NODE_DAC | NODE_ADC, PARAM_STREAM_FORMATS) => CODEC_STREAM_FORMATS,

        (NODE_DAC, PARAM_AUDIO_WIDGET_CAP) => 0x0000_0005,
        (NODE_DAC, PARAM_OUTPUT_AMP_CAP) => CODEC_AMP_CAP,

        (NODE_ADC, PARAM_AUDIO_WIDGET_CAP) => 0x0010_0003,
        (NODE_ADC, PARAM_INPUT_AMP_CAP) => CODEC_AMP_CAP,
        (NODE_ADC, PARAM_CONN_LIST_LEN) => 1,

        (NODE_PIN_OUT, PARAM_AUDIO_WIDGET_CAP) => 0x0040_0100,
        (NODE_PIN_OUT, PARAM_PIN_CAP) => 0x14,
        (NODE_PIN_OUT, PARAM_CONN_LIST_LEN) => 1,

        (NODE_PIN_IN, PARAM_AUDIO_WIDGET_CAP) => 0x0040_0000,
        (NODE_PIN_IN, PARAM_PIN_CAP) => 0x24,

        _ => 0,
    }
}

fn connection_entry(nid: u8, index: u32) -> u32 {
    match (nid, index) {
        (NODE_PIN_OUT, 0) => u32::from(NODE_DAC),
        (NODE_ADC, 0) => u32::from(NODE_PIN_IN),
        _ => 0,
    }
}

fn config_default(nid: u8) -> u32 {
    match nid {
        // Line out, front jack.
        NODE_PIN_OUT => 0x0101_0010,
        // Mic in, front jack.
        NODE_PIN_IN => 0x01A1_0010,
        _ => 0,
    }
}

/// One decoded CORB verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecCmd {
    pub cad: u8,
    pub nid: u8,
    pub verb: u32,
    pub payload: u32,
}

impl CodecCmd {
    /// Splits a raw CORB word. Standard verb ids live in 0x7xx/0xFxx, so
    /// bits 18:16 all set selects the 12-bit-verb/8-bit-payload encoding.
    pub fn decode(word: u32) -> Self {
        let cad = ((word >> 28) & 0xF) as u8;
        let nid = ((word >> 20) & 0xFF) as u8;
        if word & 0x7_0000 == 0x7_0000 {
            Self {
                cad,
                nid,
                verb: (word >> 8) & 0xFFF,
                payload: word & 0xFF,
            }
        } else {
            Self {
                cad,
                nid,
                verb: (word >> 16) & 0xF,
                payload: word & 0xFFFF,
            }
        }
    }
}

/// Controller capabilities a codec calls back into.
pub trait HdaOps {
    /// Raises the codec's STATESTS presence bit.
    fn signal(&mut self, cad: u8);
    /// Queues one response on the RIRB.
    fn respond(&mut self, cad: u8, response: u32, unsolicited: bool);
    /// Moves bytes for the (tag, direction) pair through the stream engine.
    fn transfer(&mut self, tag: u8, dir: StreamDir, buf: &mut [u8])
        -> Result<(), StreamError>;
}

/// Mutable state of one converter widget plus its amp.
#[derive(Debug, Clone, Copy)]
struct Converter {
    fmt: u16,
    tag: u8,
    channel: u8,
    /// Amp bytes in response layout: mute in bit 7, gain in bits 6:0.
    amp_left: u8,
    amp_right: u8,
}

impl Converter {
    fn powered_on() -> Self {
        Self {
            fmt: 0,
            tag: 0,
            channel: 0,
            amp_left: 0x4A,
            amp_right: 0x4A,
        }
    }
}

pub struct HdaCodec {
    cad: u8,
    output: Converter,
    input: Converter,
    pin_out_ctrl: u8,
    pin_in_ctrl: u8,
    power_state: u8,
    playback: Option<WorkerHandle>,
    capture: Option<WorkerHandle>,
}

impl HdaCodec {
    pub fn new(cad: u8) -> Self {
        Self {
            cad,
            output: Converter::powered_on(),
            input: Converter::powered_on(),
            pin_out_ctrl: PIN_CTRL_OUT_EN,
            pin_in_ctrl: PIN_CTRL_IN_EN,
            power_state: 0,
            playback: None,
            capture: None,
        }
    }

    pub fn cad(&self) -> u8 {
        self.cad
    }

    /// Hands the codec the worker it should start/stop for `dir`. Without a
    /// handle the notifications are accepted and ignored.
    pub fn attach_worker(&mut self, dir: StreamDir, handle: WorkerHandle) {
        match dir {
            StreamDir::Output => self.playback = Some(handle),
            StreamDir::Input => self.capture = Some(handle),
        }
    }

    /// Function-level reset: converter/pin/power state returns to power-on
    /// values, both workers park, and presence is re-signalled.
    pub fn reset(&mut self, ops: &mut dyn HdaOps) {
        self.output = Converter::powered_on();
        self.input = Converter::powered_on();
        self.pin_out_ctrl = PIN_CTRL_OUT_EN;
        self.pin_in_ctrl = PIN_CTRL_IN_EN;
        self.power_state = 0;
        self.park_worker(StreamDir::Output);
        self.park_worker(StreamDir::Input);
        ops.signal(self.cad);
    }

    /// Executes one verb. Every command addressed to a valid node produces
    /// exactly one solicited response; an out-of-range node id drops the
    /// command entirely.
    pub fn command(&mut self, cmd: CodecCmd, ops: &mut dyn HdaOps) {
        if cmd.nid >= NODE_COUNT {
            debug!(nid = cmd.nid, verb = cmd.verb, "verb to unknown node dropped");
            return;
        }
        let response = self.execute(cmd);
        ops.respond(self.cad, response, false);
    }

    /// Stream-engine notification that a hardware stream with `tag` started
    /// or stopped in `dir`. Starts/stops the matching worker, if any.
    pub fn notify_stream(&mut self, tag: u8, dir: StreamDir, running: bool) {
        if tag == 0 {
            return;
        }
        let conv = match dir {
            StreamDir::Output => &self.output,
            StreamDir::Input => &self.input,
        };
        if conv.tag != tag {
            return;
        }
        if running {
            self.start_worker(dir);
        } else {
            self.park_worker(dir);
        }
    }

    /// Stream tag currently programmed on the converter for `dir` (0 when
    /// the converter is parked).
    pub(crate) fn converter_tag(&self, dir: StreamDir) -> u8 {
        match dir {
            StreamDir::Output => self.output.tag,
            StreamDir::Input => self.input.tag,
        }
    }

    fn worker(&self, dir: StreamDir) -> Option<&WorkerHandle> {
        match dir {
            StreamDir::Output => self.playback.as_ref(),
            StreamDir::Input => self.capture.as_ref(),
        }
    }

    fn start_worker(&mut self, dir: StreamDir) {
        let fmt = match dir {
            StreamDir::Output => self.output.fmt,
            StreamDir::Input => self.input.fmt,
        };
        let Some(handle) = self.worker(dir) else {
            return;
        };
        match decode_format(fmt) {
            Ok(params) => {
                if !handle.start(params) {
                    warn!(cad = self.cad, ?dir, "audio backend refused stream setup");
                }
            }
            Err(err) => {
                warn!(cad = self.cad, ?dir, %err, "stream format not startable");
            }
        }
    }

    fn park_worker(&mut self, dir: StreamDir) {
        if let Some(handle) = self.worker(dir) {
            handle.request_stop();
        }
    }

    fn converter_mut(&mut self, nid: u8) -> Option<&mut Converter> {
        match nid {
            NODE_DAC => Some(&mut self.output),
            NODE_ADC => Some(&mut self.input),
            _ => None,
        }
    }

    fn pin_ctrl_mut(&mut self, nid: u8) -> Option<&mut u8> {
        match nid {
            NODE_PIN_OUT => Some(&mut self.pin_out_ctrl),
            NODE_PIN_IN => Some(&mut self.pin_in_ctrl),
            _ => None,
        }
    }

    fn execute(&mut self, cmd: CodecCmd) -> u32 {
        match cmd.verb {
            VERB_GET_PARAMETER => node_parameter(cmd.nid, cmd.payload),
            VERB_GET_CONN_LIST_ENTRY => connection_entry(cmd.nid, cmd.payload),
            VERB_GET_CONFIG_DEFAULT => config_default(cmd.nid),
            VERB_GET_SUBSYSTEM_ID => CODEC_SUBSYSTEM_ID,
            // The modeled jacks are permanently occupied.
            VERB_GET_PIN_SENSE => 0x8000_0000,

            VERB_GET_POWER_STATE if cmd.nid == NODE_AFG => {
                let state = u32::from(self.power_state);
                state | (state << 4)
            }
            VERB_SET_POWER_STATE if cmd.nid == NODE_AFG => {
                self.power_state = (cmd.payload & 0xF) as u8;
                0
            }

            VERB_GET_PIN_WIDGET_CTRL => self
                .pin_ctrl_mut(cmd.nid)
                .map_or(0, |ctrl| u32::from(*ctrl)),
            VERB_SET_PIN_WIDGET_CTRL => {
                if let Some(ctrl) = self.pin_ctrl_mut(cmd.nid) {
                    *ctrl = cmd.payload as u8;
                }
                0
            }

            VERB_GET_CONVERTER_FORMAT => self
                .converter_mut(cmd.nid)
                .map_or(0, |conv| u32::from(conv.fmt)),
            VERB_SET_CONVERTER_FORMAT => {
                if let Some(conv) = self.converter_mut(cmd.nid) {
                    conv.fmt = cmd.payload as u16;
                }
                0
            }

            VERB_GET_AMP_GAIN_MUTE => self.converter_mut(cmd.nid).map_or(0, |conv| {
                if cmd.payload & AMP_SEL_LEFT != 0 {
                    u32::from(conv.amp_left)
                } else {
                    u32::from(conv.amp_right)
                }
            }),
            VERB_SET_AMP_GAIN_MUTE => {
                let value = (cmd.payload & AMP_VALUE_MASK) as u8;
                if let Some(conv) = self.converter_mut(cmd.nid) {
                    if cmd.payload & AMP_SEL_LEFT != 0 {
                        conv.amp_left = value;
                    }
                    if cmd.payload & AMP_SEL_RIGHT != 0 {
                        conv.amp_right = value;
                    }
                }
                0
            }

            VERB_GET_CONV_STREAM_CHAN => self.converter_mut(cmd.nid).map_or(0, |conv| {
                u32::from(conv.tag) << 4 | u32::from(conv.channel)
            }),
            VERB_SET_CONV_STREAM_CHAN => {
                let tag = ((cmd.payload >> 4) & 0xF) as u8;
                let channel = (cmd.payload & 0xF) as u8;
                let dir = match cmd.nid {
                    NODE_DAC => Some(StreamDir::Output),
                    NODE_ADC => Some(StreamDir::Input),
                    _ => None,
                };
                if let Some(conv) = self.converter_mut(cmd.nid) {
                    conv.tag = tag;
                    conv.channel = channel;
                }
                // Tag 0 detaches the converter; its worker stops right away.
                if let Some(dir) = dir {
                    if tag == 0 {
                        self.park_worker(dir);
                    }
                }
                0
            }

            other => {
                debug!(nid = cmd.nid, verb = other, "unknown verb answered with zero");
                0
            }
        }
    }
}
