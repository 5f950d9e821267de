//! x86_64 context switching (System V)

use std::arch::naked_asm;

use super::EntryFn;

/// Callee-saved register file plus resume address
#[repr(C)]
#[derive(Debug, Default, Clone)]
pub struct Context {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
}

/// Prime `ctx` so switching to it runs `entry` on the stack whose aligned
/// top is `sp`.
pub fn init_context(ctx: &mut Context, sp: usize, entry: EntryFn) {
    *ctx = Context::default();
    // 16-byte aligned here; the trampoline's `call` leaves entry with the
    // ABI-expected rsp % 16 == 8.
    ctx.rsp = (sp & !0xF) as u64;
    ctx.rip = lwt_trampoline as usize as u64;
    ctx.r12 = entry as usize as u64;
}

/// Save the running context into `from` and resume `to`.
///
/// # Safety
///
/// Both pointers must be valid for the duration of the switch, and `to`
/// must hold a context primed by [`init_context`] or saved by `switch`
/// whose stack is still mapped.
#[inline]
pub unsafe fn switch(from: *mut Context, to: *const Context) {
    context_switch(from, to)
}

#[unsafe(naked)]
unsafe extern "C" fn lwt_trampoline() {
    naked_asm!(
        "call r12",
        "ud2",
    );
}

#[unsafe(naked)]
unsafe extern "C" fn context_switch(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        // Save callee-saved registers to `from` (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load `to` (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        // Resume point of a saved context
        "1:",
        "ret",
    );
}
