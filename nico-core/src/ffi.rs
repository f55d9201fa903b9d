//! C ABI for linking nico-core as a static library from Android (NDK) or
//! other C/C++ hosts. The host does its own socket I/O and calls in here for
//! framing, so the wire format lives in exactly one place.
//!
//! Conventions: strings are UTF-8 with explicit lengths (not NUL-terminated);
//! functions that fill a caller buffer return bytes written, or -1 on error
//! (null pointer, invalid field, buffer too small).

use std::os::raw::c_int;
use std::slice;

use crate::message::Message;
use crate::protocol::{
    default_device_name, DISCOVERY_PROBE, DEFAULT_DISCOVERY_PORT, DEFAULT_MESSAGE_PORT,
};
use crate::wire::{decode_discovery, decode_message, encode_message, encode_response, Discovery};

/// Well-known message transport port.
#[no_mangle]
pub extern "C" fn nico_core_message_port() -> u16 {
    DEFAULT_MESSAGE_PORT
}

/// Well-known discovery port.
#[no_mangle]
pub extern "C" fn nico_core_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}

/// Derive the default device display name from the local IP (UTF-8 text,
/// e.g. "192.168.1.7"). Returns bytes written to out_buf, or -1 on error.
#[no_mangle]
pub extern "C" fn nico_core_default_device_name(
    ip: *const u8,
    ip_len: usize,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if ip.is_null() || out_buf.is_null() {
        return -1;
    }
    let ip_slice = unsafe { slice::from_raw_parts(ip, ip_len) };
    let ip_str = match std::str::from_utf8(ip_slice) {
        Ok(s) => s,
        Err(_) => return -1,
    };
    let parsed: std::net::IpAddr = match ip_str.parse() {
        Ok(a) => a,
        Err(_) => return -1,
    };
    write_out(default_device_name(parsed).as_bytes(), out_buf, out_buf_len)
}

/// Encode one message frame (newline-terminated). Returns bytes written to
/// out_buf, or -1 on error.
#[no_mangle]
pub extern "C" fn nico_core_encode_message(
    chat: *const u8,
    chat_len: usize,
    sender: *const u8,
    sender_len: usize,
    body: *const u8,
    body_len: usize,
    sent_at_ms: i64,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if chat.is_null() || sender.is_null() || body.is_null() || out_buf.is_null() {
        return -1;
    }
    let (chat, sender, body) = unsafe {
        let chat = std::str::from_utf8(slice::from_raw_parts(chat, chat_len));
        let sender = std::str::from_utf8(slice::from_raw_parts(sender, sender_len));
        let body = std::str::from_utf8(slice::from_raw_parts(body, body_len));
        match (chat, sender, body) {
            (Ok(c), Ok(s), Ok(b)) => (c, s, b),
            _ => return -1,
        }
    };
    let msg = Message::outgoing(chat, sender, body, sent_at_ms);
    let frame = match encode_message(&msg) {
        Ok(f) => f,
        Err(_) => return -1,
    };
    write_out(frame.as_bytes(), out_buf, out_buf_len)
}

/// Decode one message frame. Fills the three field buffers (each with its
/// written length) and the timestamp. Returns 0 on success, -1 on error.
#[no_mangle]
pub extern "C" fn nico_core_decode_message(
    line: *const u8,
    line_len: usize,
    out_chat: *mut u8,
    out_chat_cap: usize,
    out_chat_len: *mut usize,
    out_sender: *mut u8,
    out_sender_cap: usize,
    out_sender_len: *mut usize,
    out_body: *mut u8,
    out_body_cap: usize,
    out_body_len: *mut usize,
    out_sent_at_ms: *mut i64,
) -> c_int {
    if line.is_null()
        || out_chat.is_null()
        || out_chat_len.is_null()
        || out_sender.is_null()
        || out_sender_len.is_null()
        || out_body.is_null()
        || out_body_len.is_null()
        || out_sent_at_ms.is_null()
    {
        return -1;
    }
    let line_slice = unsafe { slice::from_raw_parts(line, line_len) };
    let line_str = match std::str::from_utf8(line_slice) {
        Ok(s) => s,
        Err(_) => return -1,
    };
    let msg = match decode_message(line_str) {
        Ok(m) => m,
        Err(_) => return -1,
    };
    let chat_n = write_out(msg.chat_name.as_bytes(), out_chat, out_chat_cap);
    let sender_n = write_out(msg.sender.as_bytes(), out_sender, out_sender_cap);
    let body_n = write_out(msg.body.as_bytes(), out_body, out_body_cap);
    if chat_n < 0 || sender_n < 0 || body_n < 0 {
        return -1;
    }
    unsafe {
        *out_chat_len = chat_n as usize;
        *out_sender_len = sender_n as usize;
        *out_body_len = body_n as usize;
        *out_sent_at_ms = msg.sent_at_ms;
    }
    0
}

/// Fill out_buf with the discovery probe datagram. Returns bytes written,
/// or -1 on error.
#[no_mangle]
pub extern "C" fn nico_core_probe_frame(out_buf: *mut u8, out_buf_len: usize) -> c_int {
    if out_buf.is_null() {
        return -1;
    }
    write_out(DISCOVERY_PROBE.as_bytes(), out_buf, out_buf_len)
}

/// Fill out_buf with a discovery response datagram carrying `name`. Returns
/// bytes written, or -1 on error (e.g. name contains the separator).
#[no_mangle]
pub extern "C" fn nico_core_response_frame(
    name: *const u8,
    name_len: usize,
    out_buf: *mut u8,
    out_buf_len: usize,
) -> c_int {
    if name.is_null() || out_buf.is_null() {
        return -1;
    }
    let name_slice = unsafe { slice::from_raw_parts(name, name_len) };
    let name_str = match std::str::from_utf8(name_slice) {
        Ok(s) => s,
        Err(_) => return -1,
    };
    let datagram = match encode_response(name_str) {
        Ok(d) => d,
        Err(_) => return -1,
    };
    write_out(datagram.as_bytes(), out_buf, out_buf_len)
}

/// Decode a discovery datagram. Returns 1 for a probe, 2 for a response
/// (out_name_buf filled, length written to out_name_len), -1 on error.
#[no_mangle]
pub extern "C" fn nico_core_decode_discovery(
    bytes: *const u8,
    len: usize,
    out_name_buf: *mut u8,
    out_name_cap: usize,
    out_name_len: *mut usize,
) -> c_int {
    if bytes.is_null() || out_name_buf.is_null() || out_name_len.is_null() {
        return -1;
    }
    let slice = unsafe { slice::from_raw_parts(bytes, len) };
    let text = String::from_utf8_lossy(slice);
    match decode_discovery(&text) {
        Ok(Discovery::Probe) => {
            unsafe {
                *out_name_len = 0;
            }
            1
        }
        Ok(Discovery::Response { name }) => {
            let n = write_out(name.as_bytes(), out_name_buf, out_name_cap);
            if n < 0 {
                return -1;
            }
            unsafe {
                *out_name_len = n as usize;
            }
            2
        }
        Err(_) => -1,
    }
}

fn write_out(data: &[u8], out_buf: *mut u8, out_buf_len: usize) -> c_int {
    if data.len() > out_buf_len {
        return -1;
    }
    unsafe {
        out_buf.copy_from_nonoverlapping(data.as_ptr(), data.len());
    }
    data.len() as c_int
}
