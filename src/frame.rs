//! # Context Frame
//!
//! Layout of the register image a task's stack holds while the task is not
//! running. The frame has two halves:
//!
//! ```text
//!   high address  ┌──────────┐  <- stack top
//!                 │  xPSR    │  ┐
//!                 │  PC      │  │
//!                 │  LR      │  │ stacked by hardware on exception entry,
//!                 │  R12     │  │ unstacked on exception return
//!                 │  R3..R0  │  ┘
//!                 │  R11..R4 │  ] stacked by PendSV (stmdb / ldmia)
//!   low address   └──────────┘  <- TCB stack_pointer
//! ```
//!
//! The PendSV handler in `arch::cortex_m4` is the only code that moves real
//! registers through this layout. The functions here describe the same
//! discipline in memory so the bootstrapper can build frames the handler will
//! accept.

use core::mem::size_of;

/// Number of words the hardware stacks on exception entry.
pub const HW_FRAME_WORDS: usize = 8;

/// Number of callee-saved words PendSV stacks itself (R4–R11).
pub const SW_FRAME_WORDS: usize = 8;

/// Size in bytes of a complete context frame.
pub const FRAME_BYTES: usize = (HW_FRAME_WORDS + SW_FRAME_WORDS) * 4;

/// xPSR for a fresh task: only the Thumb bit is set.
pub const INITIAL_XPSR: u32 = 0x0100_0000;

/// EXC_RETURN value: return to Thread mode, use the process stack.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// The callee-saved registers R4–R11, in ascending memory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct CalleeSaved {
    pub regs: [u32; SW_FRAME_WORDS],
}

impl CalleeSaved {
    /// All callee-saved registers cleared.
    pub const ZERO: CalleeSaved = CalleeSaved {
        regs: [0; SW_FRAME_WORDS],
    };
}

/// The part of the frame the processor stacks and unstacks by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

impl ExceptionFrame {
    /// Frame that starts executing `entry` in Thumb state on exception
    /// return. The link register holds EXC_RETURN, so a task that ever
    /// returned would fault instead of running off into memory.
    pub fn initial(entry: usize) -> Self {
        Self {
            r0: 0,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: EXC_RETURN_THREAD_PSP,
            // Bit 0 of a Thumb function address is the interworking bit;
            // the stacked return address must be halfword aligned.
            pc: (entry as u32) & !1,
            xpsr: INITIAL_XPSR,
        }
    }
}

/// A complete frame as it sits in memory, lowest address first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TaskFrame {
    pub callee: CalleeSaved,
    pub exception: ExceptionFrame,
}

const _: () = assert!(size_of::<TaskFrame>() == FRAME_BYTES);
const _: () = assert!(size_of::<ExceptionFrame>() == HW_FRAME_WORDS * 4);

/// Push the callee-saved registers below `sp`, as `stmdb sp!, {r4-r11}`
/// does, and return the new stack pointer.
///
/// # Safety
/// The `SW_FRAME_WORDS` words below `sp` must be writable.
pub unsafe fn save_callee(sp: *mut u32, regs: &CalleeSaved) -> *mut u32 {
    let base = sp.sub(SW_FRAME_WORDS);
    for (i, word) in regs.regs.iter().enumerate() {
        base.add(i).write_volatile(*word);
    }
    base
}

/// Pop the callee-saved registers from `sp`, as `ldmia sp!, {r4-r11}` does,
/// and return them with the new stack pointer.
///
/// # Safety
/// `sp` must point at `SW_FRAME_WORDS` readable words.
pub unsafe fn restore_callee(sp: *mut u32) -> (CalleeSaved, *mut u32) {
    let mut regs = CalleeSaved::ZERO;
    for (i, word) in regs.regs.iter_mut().enumerate() {
        *word = sp.add(i).read_volatile();
    }
    (regs, sp.add(SW_FRAME_WORDS))
}

/// Write the initial frame for a task starting at `entry` just below `top`
/// and return the resulting stack pointer.
///
/// # Safety
/// `top` must be 8-byte aligned and the `FRAME_BYTES` below it writable.
pub unsafe fn write_initial(top: *mut u32, entry: usize) -> *mut u32 {
    let hw = top.sub(HW_FRAME_WORDS) as *mut ExceptionFrame;
    hw.write_volatile(ExceptionFrame::initial(entry));
    save_callee(hw as *mut u32, &CalleeSaved::ZERO)
}

/// Read back the frame a non-running task is parked on.
///
/// # Safety
/// `sp` must point at a complete frame.
pub unsafe fn read(sp: *const u32) -> TaskFrame {
    (sp as *const TaskFrame).read_volatile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(8))]
    struct Scratch([u32; 32]);

    fn top_of(scratch: &mut Scratch) -> *mut u32 {
        unsafe { scratch.0.as_mut_ptr().add(scratch.0.len()) }
    }

    #[test]
    fn test_initial_frame_layout() {
        let mut scratch = Scratch([0xDEAD_BEEF; 32]);
        let top = top_of(&mut scratch);
        let sp = unsafe { write_initial(top, 0x0800_1235) };

        assert_eq!(top as usize - sp as usize, FRAME_BYTES);

        let words = &scratch.0[32 - 16..];
        // R4..R11, R0..R3, R12 cleared
        assert!(words[..13].iter().all(|w| *w == 0));
        assert_eq!(words[13], EXC_RETURN_THREAD_PSP);
        assert_eq!(words[14], 0x0800_1234);
        assert_eq!(words[15], INITIAL_XPSR);
        // Nothing below the frame was touched.
        assert!(scratch.0[..16].iter().all(|w| *w == 0xDEAD_BEEF));
    }

    #[test]
    fn test_read_matches_written_frame() {
        let mut scratch = Scratch([0; 32]);
        let top = top_of(&mut scratch);
        let sp = unsafe { write_initial(top, 0x0800_0401) };
        let frame = unsafe { read(sp) };
        assert_eq!(frame.callee, CalleeSaved::ZERO);
        assert_eq!(frame.exception, ExceptionFrame::initial(0x0800_0401));
        assert_eq!(frame.exception.pc, 0x0800_0400);
    }

    #[test]
    fn test_save_restore_symmetry() {
        let patterns = [
            CalleeSaved { regs: [1, 2, 3, 4, 5, 6, 7, 8] },
            CalleeSaved { regs: [u32::MAX; 8] },
            CalleeSaved { regs: [0xA5A5_A5A5, 0, 0x5A5A_5A5A, 0, 0xFFFF_0000, 0x0000_FFFF, 0x8000_0000, 1] },
        ];
        for regs in patterns {
            let mut scratch = Scratch([0; 32]);
            let top = top_of(&mut scratch);
            let saved_sp = unsafe { save_callee(top, &regs) };
            assert_eq!(top as usize - saved_sp as usize, SW_FRAME_WORDS * 4);

            let (restored, sp) = unsafe { restore_callee(saved_sp) };
            assert_eq!(restored, regs);
            assert_eq!(sp, top);
        }
    }

    #[test]
    fn test_r4_sits_at_lowest_address() {
        let mut scratch = Scratch([0; 32]);
        let top = top_of(&mut scratch);
        let regs = CalleeSaved { regs: [4, 5, 6, 7, 8, 9, 10, 11] };
        unsafe { save_callee(top, &regs) };
        assert_eq!(&scratch.0[24..], &[4, 5, 6, 7, 8, 9, 10, 11]);
    }
}
