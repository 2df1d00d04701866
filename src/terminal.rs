use crossterm::{cursor, execute};
use std::io::{self, IsTerminal};
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use tracing::debug;

/// Hides the cursor and stops stdin from echoing while the table is shown.
/// Everything is put back on drop, whichever way the program exits.
pub struct TerminalGuard {
    saved: Option<libc::termios>,
}

impl TerminalGuard {
    pub fn acquire() -> io::Result<Self> {
        let saved = if io::stdin().is_terminal() {
            Some(quiet_stdin()?)
        } else {
            debug!("stdin is not a terminal, leaving input mode alone");
            None
        };
        execute!(io::stdout(), cursor::Hide)?;
        Ok(Self { saved })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Some(saved) = &self.saved {
            // SAFETY: `saved` was filled in by tcgetattr on the same descriptor.
            unsafe {
                libc::tcsetattr(io::stdin().as_raw_fd(), libc::TCSANOW, saved);
            }
        }
        let _ = execute!(io::stdout(), cursor::Show);
    }
}

// Non-canonical, no echo, reads return immediately. Returns the previous settings.
fn quiet_stdin() -> io::Result<libc::termios> {
    let fd = io::stdin().as_raw_fd();
    let mut original = MaybeUninit::<libc::termios>::uninit();

    // SAFETY: tcgetattr fully initializes the struct when it returns 0.
    let original = unsafe {
        if libc::tcgetattr(fd, original.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        original.assume_init()
    };

    let mut quiet = original;
    quiet.c_lflag &= !(libc::ICANON | libc::ECHO);
    quiet.c_cc[libc::VMIN] = 0;
    quiet.c_cc[libc::VTIME] = 0;

    // SAFETY: `quiet` is a valid termios copied from the current settings.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &quiet) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(original)
}
