//! DOS INT 21h table
//!
//! The function number is AH. The trap gateway hands the registers over as
//! `a1 = DX`, `a2 = CX`, `a3 = BX`, `a4 = AL`, `a5 = SI`, `a6 = DI`, with
//! DS:DX style pointers already flattened to linear addresses. Failures
//! come back as the negated DOS error code.

use alloc::string::String;

use lk_api::{AbiFlags, OpenMode, Result, SyscallArgs};

use super::{
    access_mode, chdir, close, finish, mkdir, open, read, rmdir, unlink, write, DosError,
    DosResult, DosState, DRIVE_COUNT, MAX_CWD,
};
use crate::abi::MAX_USER_STRING;
use crate::core::env::Caller;
use crate::core::table::SyscallTable;

/// One slot per possible AH value
pub const TABLE_SIZE: u32 = 0x100;

/// INT 21h function numbers
pub mod nr {
    pub const TERMINATE: u32 = 0x00;
    pub const CHAR_INPUT: u32 = 0x01;
    pub const CHAR_OUTPUT: u32 = 0x02;
    pub const AUX_INPUT: u32 = 0x03;
    pub const AUX_OUTPUT: u32 = 0x04;
    pub const PRINTER_OUTPUT: u32 = 0x05;
    pub const DIRECT_CONSOLE_IO: u32 = 0x06;
    pub const DIRECT_CHAR_INPUT: u32 = 0x07;
    pub const CHAR_INPUT_NO_ECHO: u32 = 0x08;
    pub const WRITE_STRING: u32 = 0x09;
    pub const BUFFERED_INPUT: u32 = 0x0A;
    pub const INPUT_STATUS: u32 = 0x0B;
    pub const SELECT_DRIVE: u32 = 0x0E;
    pub const CURRENT_DRIVE: u32 = 0x19;
    pub const SET_DTA: u32 = 0x1A;
    pub const SET_VECTOR: u32 = 0x25;
    pub const GET_DATE: u32 = 0x2A;
    pub const GET_TIME: u32 = 0x2C;
    pub const SET_VERIFY: u32 = 0x2E;
    pub const GET_DTA: u32 = 0x2F;
    pub const GET_VERSION: u32 = 0x30;
    pub const CTRL_BREAK: u32 = 0x33;
    pub const GET_VECTOR: u32 = 0x35;
    pub const FREE_SPACE: u32 = 0x36;
    pub const MKDIR: u32 = 0x39;
    pub const RMDIR: u32 = 0x3A;
    pub const CHDIR: u32 = 0x3B;
    pub const CREATE: u32 = 0x3C;
    pub const OPEN: u32 = 0x3D;
    pub const CLOSE: u32 = 0x3E;
    pub const READ: u32 = 0x3F;
    pub const WRITE: u32 = 0x40;
    pub const DELETE: u32 = 0x41;
    pub const SEEK: u32 = 0x42;
    pub const ATTRIBUTES: u32 = 0x43;
    pub const IOCTL: u32 = 0x44;
    pub const DUP: u32 = 0x45;
    pub const DUP2: u32 = 0x46;
    pub const GET_CWD: u32 = 0x47;
    pub const ALLOC: u32 = 0x48;
    pub const FREE: u32 = 0x49;
    pub const RESIZE: u32 = 0x4A;
    pub const EXEC: u32 = 0x4B;
    pub const EXIT: u32 = 0x4C;
    pub const RETURN_CODE: u32 = 0x4D;
    pub const FIND_FIRST: u32 = 0x4E;
    pub const FIND_NEXT: u32 = 0x4F;
    pub const GET_VERIFY: u32 = 0x54;
    pub const RENAME: u32 = 0x56;
    pub const FILE_TIME: u32 = 0x57;
    pub const GET_PSP: u32 = 0x62;
}

/// Reported by function 30h: major 5 in AL, minor 0 in AH
pub const DOS_VERSION: i32 = 0x0005;

const fn low_byte(word: u32) -> u8 {
    (word & 0xFF) as u8
}

fn terminate(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    finish(caller.exit(0).map(|_| 0).map_err(DosError::from))
}

fn exit(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    let status = i32::from(low_byte(args.a4));
    finish(caller.exit(status).map(|_| 0).map_err(DosError::from))
}

/// Takes one console byte, giving other processes one chance to supply it
fn next_input(caller: &Caller<'_>) -> Option<u8> {
    caller.console().read_byte().or_else(|| {
        caller.scheduler().yield_now();
        caller.console().read_byte()
    })
}

fn char_input(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    match next_input(caller) {
        Some(byte) => {
            caller.console().write_bytes(&[byte]);
            i32::from(byte)
        }
        None => 0,
    }
}

fn char_input_no_echo(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    next_input(caller).map_or(0, i32::from)
}

fn char_output(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    caller.console().write_bytes(&[low_byte(args.a1)]);
    0
}

fn direct_console_io(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    match low_byte(args.a1) {
        0xFF => caller.console().read_byte().map_or(0, i32::from),
        byte => {
            caller.console().write_bytes(&[byte]);
            0
        }
    }
}

/// Prints the `$`-terminated string at `addr`
fn print_dollar_string(caller: &Caller<'_>, addr: u32) -> DosResult {
    let text = caller.memory().read_until(addr, b'$', MAX_USER_STRING)?;
    caller.console().write_bytes(&text);
    Ok(0)
}

fn write_string(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(print_dollar_string(caller, args.a1))
}

fn select_drive(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    let drive = low_byte(args.a1);
    let result: DosResult = caller
        .with_state(|s: &mut DosState| {
            if drive < DRIVE_COUNT {
                s.drive = drive;
            }
            i32::from(DRIVE_COUNT)
        })
        .map_err(DosError::from);
    finish(result)
}

fn current_drive(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    finish(
        caller
            .with_state(|s: &mut DosState| i32::from(s.drive))
            .map_err(DosError::from),
    )
}

fn set_dta(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(
        caller
            .with_state(|s: &mut DosState| {
                s.dta = args.a1;
                0
            })
            .map_err(DosError::from),
    )
}

fn get_dta(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    finish(
        caller
            .with_state(|s: &mut DosState| s.dta as i32)
            .map_err(DosError::from),
    )
}

fn update_flag(caller: &Caller<'_>, flag: AbiFlags, on: bool) -> Result<()> {
    let mut flags = caller.flags();
    flags.set(flag, on);
    caller.set_flags(flags)
}

fn set_verify(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    let on = low_byte(args.a4) != 0;
    finish(update_flag(caller, AbiFlags::VERIFY, on).map(|_| 0).map_err(DosError::from))
}

fn get_verify(caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    i32::from(caller.flags().contains(AbiFlags::VERIFY))
}

fn get_version(_caller: &Caller<'_>, _args: SyscallArgs) -> i32 {
    DOS_VERSION
}

/// AL = 0 reads the Ctrl-Break flag, AL = 1 sets it from DL
fn ctrl_break(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    match low_byte(args.a4) {
        0 => i32::from(caller.flags().contains(AbiFlags::BREAK_CHECK)),
        1 => {
            let on = low_byte(args.a1) != 0;
            finish(
                update_flag(caller, AbiFlags::BREAK_CHECK, on)
                    .map(|_| i32::from(on))
                    .map_err(DosError::from),
            )
        }
        _ => DosError::INVALID_FUNCTION.as_return(),
    }
}

fn make_dir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(mkdir(caller, args.a1))
}

fn remove_dir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(rmdir(caller, args.a1))
}

fn change_dir(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(chdir(caller, args.a1))
}

fn create(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    let mode = OpenMode::READ | OpenMode::WRITE | OpenMode::CREATE | OpenMode::TRUNCATE;
    finish(open(caller, args.a1, mode))
}

fn open_file(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(access_mode(args.a4).and_then(|mode| open(caller, args.a1, mode)))
}

fn close_file(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(close(caller, args.a3 as u16))
}

fn read_file(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(read(caller, args.a3 as u16, args.a1, args.a2 & 0xFFFF))
}

fn write_file(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(write(caller, args.a3 as u16, args.a1, args.a2 & 0xFFFF))
}

fn delete(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(unlink(caller, args.a1))
}

/// Copies the current directory of `requested` (0 = default, 1 = A:) to
/// `buf` as a NUL-terminated string
fn copy_cwd(caller: &Caller<'_>, requested: u8, buf: u32) -> DosResult {
    let dir = caller.with_state(|s: &mut DosState| {
        let drive = match requested {
            0 => Some(s.drive),
            n if n <= DRIVE_COUNT => Some(n - 1),
            _ => None,
        };
        drive.map(|d| String::from(s.cwd(d)))
    })?;
    let mut dir = dir.ok_or(DosError::INVALID_DRIVE)?.into_bytes();
    dir.truncate(MAX_CWD - 1);
    dir.push(0);
    caller.memory().write(buf, &dir)?;
    Ok(0)
}

/// DL = drive, DS:SI = 64-byte buffer
fn get_cwd(caller: &Caller<'_>, args: SyscallArgs) -> i32 {
    finish(copy_cwd(caller, low_byte(args.a1), args.a5))
}

/// Builds the INT 21h table
pub fn build_table() -> Result<SyscallTable> {
    SyscallTable::builder(TABLE_SIZE)
        .handler(nr::TERMINATE, "terminate", terminate)
        .handler(nr::CHAR_INPUT, "char_input", char_input)
        .handler(nr::CHAR_OUTPUT, "char_output", char_output)
        .name(nr::AUX_INPUT, "aux_input")
        .name(nr::AUX_OUTPUT, "aux_output")
        .name(nr::PRINTER_OUTPUT, "printer_output")
        .handler(nr::DIRECT_CONSOLE_IO, "direct_console_io", direct_console_io)
        .handler(nr::DIRECT_CHAR_INPUT, "direct_char_input", char_input_no_echo)
        .handler(nr::CHAR_INPUT_NO_ECHO, "char_input_no_echo", char_input_no_echo)
        .handler(nr::WRITE_STRING, "write_string", write_string)
        .name(nr::BUFFERED_INPUT, "buffered_input")
        .name(nr::INPUT_STATUS, "input_status")
        .handler(nr::SELECT_DRIVE, "select_drive", select_drive)
        .handler(nr::CURRENT_DRIVE, "current_drive", current_drive)
        .handler(nr::SET_DTA, "set_dta", set_dta)
        .name(nr::SET_VECTOR, "set_vector")
        .name(nr::GET_DATE, "get_date")
        .name(nr::GET_TIME, "get_time")
        .handler(nr::SET_VERIFY, "set_verify", set_verify)
        .handler(nr::GET_DTA, "get_dta", get_dta)
        .handler(nr::GET_VERSION, "get_version", get_version)
        .handler(nr::CTRL_BREAK, "ctrl_break", ctrl_break)
        .name(nr::GET_VECTOR, "get_vector")
        .name(nr::FREE_SPACE, "free_space")
        .handler(nr::MKDIR, "mkdir", make_dir)
        .handler(nr::RMDIR, "rmdir", remove_dir)
        .handler(nr::CHDIR, "chdir", change_dir)
        .handler(nr::CREATE, "create", create)
        .handler(nr::OPEN, "open", open_file)
        .handler(nr::CLOSE, "close", close_file)
        .handler(nr::READ, "read", read_file)
        .handler(nr::WRITE, "write", write_file)
        .handler(nr::DELETE, "delete", delete)
        .name(nr::SEEK, "seek")
        .name(nr::ATTRIBUTES, "attributes")
        .name(nr::IOCTL, "ioctl")
        .name(nr::DUP, "dup")
        .name(nr::DUP2, "dup2")
        .handler(nr::GET_CWD, "get_cwd", get_cwd)
        .name(nr::ALLOC, "alloc")
        .name(nr::FREE, "free")
        .name(nr::RESIZE, "resize")
        .name(nr::EXEC, "exec")
        .handler(nr::EXIT, "exit", exit)
        .name(nr::RETURN_CODE, "return_code")
        .name(nr::FIND_FIRST, "find_first")
        .name(nr::FIND_NEXT, "find_next")
        .handler(nr::GET_VERIFY, "get_verify", get_verify)
        .name(nr::RENAME, "rename")
        .name(nr::FILE_TIME, "file_time")
        .name(nr::GET_PSP, "get_psp")
        .cleanup(super::cleanup)
        .build()
}
