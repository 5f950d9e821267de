//! aarch64 context switching (AAPCS64)

use std::arch::naked_asm;

use super::EntryFn;

/// Callee-saved x19-x30, sp and the low halves of v8-v15
#[repr(C)]
#[derive(Debug, Default, Clone)]
pub struct Context {
    pub x: [u64; 10], // x19..x28, 0x00
    pub fp: u64,      // x29, 0x50
    pub lr: u64,      // x30, 0x58
    pub sp: u64,      // 0x60
    pub d: [u64; 8],  // d8..d15, 0x68
}

/// Prime `ctx` so switching to it runs `entry` on the stack whose aligned
/// top is `sp`.
pub fn init_context(ctx: &mut Context, sp: usize, entry: EntryFn) {
    *ctx = Context::default();
    ctx.sp = (sp & !0xF) as u64;
    ctx.lr = lwt_trampoline as usize as u64;
    ctx.x[0] = entry as usize as u64;
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
        "blr x19",
        "brk #1",
    );
}

#[unsafe(naked)]
unsafe extern "C" fn context_switch(_from: *mut Context, _to: *const Context) {
    naked_asm!(
        // Save into `from` (x0)
        "stp x19, x20, [x0, #0x00]",
        "stp x21, x22, [x0, #0x10]",
        "stp x23, x24, [x0, #0x20]",
        "stp x25, x26, [x0, #0x30]",
        "stp x27, x28, [x0, #0x40]",
        "stp x29, x30, [x0, #0x50]",
        "mov x9, sp",
        "str x9, [x0, #0x60]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // Load `to` (x1)
        "ldp x19, x20, [x1, #0x00]",
        "ldp x21, x22, [x1, #0x10]",
        "ldp x23, x24, [x1, #0x20]",
        "ldp x25, x26, [x1, #0x30]",
        "ldp x27, x28, [x1, #0x40]",
        "ldp x29, x30, [x1, #0x50]",
        "ldr x9, [x1, #0x60]",
        "mov sp, x9",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        // Saved contexts resume after their `bl`; fresh ones enter the trampoline
        "ret",
    );
}
