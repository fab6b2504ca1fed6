//! Raw bindings to the part of sd-bus (`<systemd/sd-bus.h>`) needed to export objects.
//!
//! Docstring comments in this file were adapted from the sd-bus man pages.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_void};

pub enum sd_bus {}
pub enum sd_bus_message {}
pub enum sd_bus_slot {}

#[repr(C)]
#[derive(Debug)]
pub struct sd_bus_error {
    pub name: *const c_char,
    pub message: *const c_char,
    pub _need_free: c_int,
}

pub type sd_bus_message_handler_t =
    Option<unsafe extern "C" fn(m: *mut sd_bus_message, userdata: *mut c_void, ret_error: *mut sd_bus_error) -> c_int>;

pub const SD_BUS_MESSAGE_METHOD_CALL: u8 = 1;
pub const SD_BUS_MESSAGE_METHOD_RETURN: u8 = 2;
pub const SD_BUS_MESSAGE_METHOD_ERROR: u8 = 3;
pub const SD_BUS_MESSAGE_SIGNAL: u8 = 4;

pub const SD_BUS_TYPE_BYTE: c_char = b'y' as c_char;
pub const SD_BUS_TYPE_BOOLEAN: c_char = b'b' as c_char;
pub const SD_BUS_TYPE_INT16: c_char = b'n' as c_char;
pub const SD_BUS_TYPE_UINT16: c_char = b'q' as c_char;
pub const SD_BUS_TYPE_INT32: c_char = b'i' as c_char;
pub const SD_BUS_TYPE_UINT32: c_char = b'u' as c_char;
pub const SD_BUS_TYPE_INT64: c_char = b'x' as c_char;
pub const SD_BUS_TYPE_UINT64: c_char = b't' as c_char;
pub const SD_BUS_TYPE_DOUBLE: c_char = b'd' as c_char;
pub const SD_BUS_TYPE_STRING: c_char = b's' as c_char;
pub const SD_BUS_TYPE_OBJECT_PATH: c_char = b'o' as c_char;
pub const SD_BUS_TYPE_SIGNATURE: c_char = b'g' as c_char;
pub const SD_BUS_TYPE_UNIX_FD: c_char = b'h' as c_char;
pub const SD_BUS_TYPE_ARRAY: c_char = b'a' as c_char;
pub const SD_BUS_TYPE_VARIANT: c_char = b'v' as c_char;
pub const SD_BUS_TYPE_STRUCT: c_char = b'r' as c_char;
pub const SD_BUS_TYPE_DICT_ENTRY: c_char = b'e' as c_char;

/// Allow another service to become the primary owner if requested.
pub const SD_BUS_NAME_ALLOW_REPLACEMENT: u64 = 1 << 0;
/// Request to replace the current primary owner.
pub const SD_BUS_NAME_REPLACE_EXISTING: u64 = 1 << 1;
/// If we can not become the primary owner, queue up.
pub const SD_BUS_NAME_QUEUE: u64 = 1 << 2;

extern "C" {
    pub fn sd_bus_open_user(ret: *mut *mut sd_bus) -> c_int;
    pub fn sd_bus_open_system(ret: *mut *mut sd_bus) -> c_int;
    pub fn sd_bus_flush_close_unref(bus: *mut sd_bus) -> *mut sd_bus;
    pub fn sd_bus_get_unique_name(bus: *mut sd_bus, unique: *mut *const c_char) -> c_int;
    pub fn sd_bus_request_name(bus: *mut sd_bus, name: *const c_char, flags: u64) -> c_int;

    /// Returns positive if a message was processed, zero if there was nothing to do.
    pub fn sd_bus_process(bus: *mut sd_bus, r: *mut *mut sd_bus_message) -> c_int;
    /// `timeout_usec` of `u64::MAX` waits forever.
    pub fn sd_bus_wait(bus: *mut sd_bus, timeout_usec: u64) -> c_int;
    pub fn sd_bus_send(bus: *mut sd_bus, m: *mut sd_bus_message, cookie: *mut u64) -> c_int;

    /// The callback sees every message sent to exactly `path`. It returns positive if it
    /// handled the message, zero to let sd-bus continue looking.
    pub fn sd_bus_add_object(bus: *mut sd_bus, slot: *mut *mut sd_bus_slot, path: *const c_char,
        callback: sd_bus_message_handler_t, userdata: *mut c_void) -> c_int;
    pub fn sd_bus_slot_unref(slot: *mut sd_bus_slot) -> *mut sd_bus_slot;

    pub fn sd_bus_message_new_method_call(bus: *mut sd_bus, m: *mut *mut sd_bus_message, destination: *const c_char,
        path: *const c_char, interface: *const c_char, member: *const c_char) -> c_int;
    pub fn sd_bus_message_new_method_return(call: *mut sd_bus_message, m: *mut *mut sd_bus_message) -> c_int;
    pub fn sd_bus_message_new_method_error(call: *mut sd_bus_message, m: *mut *mut sd_bus_message,
        e: *const sd_bus_error) -> c_int;
    pub fn sd_bus_message_new_signal(bus: *mut sd_bus, m: *mut *mut sd_bus_message, path: *const c_char,
        interface: *const c_char, member: *const c_char) -> c_int;
    pub fn sd_bus_message_unref(m: *mut sd_bus_message) -> *mut sd_bus_message;
    pub fn sd_bus_message_get_bus(m: *mut sd_bus_message) -> *mut sd_bus;

    pub fn sd_bus_message_get_type(m: *mut sd_bus_message, t: *mut u8) -> c_int;
    pub fn sd_bus_message_get_cookie(m: *mut sd_bus_message, cookie: *mut u64) -> c_int;
    pub fn sd_bus_message_get_expect_reply(m: *mut sd_bus_message) -> c_int;
    pub fn sd_bus_message_get_path(m: *mut sd_bus_message) -> *const c_char;
    pub fn sd_bus_message_get_interface(m: *mut sd_bus_message) -> *const c_char;
    pub fn sd_bus_message_get_member(m: *mut sd_bus_message) -> *const c_char;
    pub fn sd_bus_message_get_sender(m: *mut sd_bus_message) -> *const c_char;
    pub fn sd_bus_message_get_destination(m: *mut sd_bus_message) -> *const c_char;

    pub fn sd_bus_message_append_basic(m: *mut sd_bus_message, t: c_char, p: *const c_void) -> c_int;
    pub fn sd_bus_message_open_container(m: *mut sd_bus_message, t: c_char, contents: *const c_char) -> c_int;
    pub fn sd_bus_message_close_container(m: *mut sd_bus_message) -> c_int;

    /// Returns positive if there was an item, zero at the end of the current container.
    pub fn sd_bus_message_peek_type(m: *mut sd_bus_message, t: *mut c_char, contents: *mut *const c_char) -> c_int;
    pub fn sd_bus_message_read_basic(m: *mut sd_bus_message, t: c_char, p: *mut c_void) -> c_int;
    pub fn sd_bus_message_enter_container(m: *mut sd_bus_message, t: c_char, contents: *const c_char) -> c_int;
    pub fn sd_bus_message_exit_container(m: *mut sd_bus_message) -> c_int;
}
