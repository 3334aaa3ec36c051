use std::sync::{Mutex, OnceLock};

#[macro_export]
macro_rules! write_errln {
    ($w:expr, $($arg:tt)*) => {{
        let _ = writeln!(($w), $($arg)*);
        let _ = ($w).flush();
    }};
}

fn verbose_flag() -> &'static Mutex<bool> {
    static VERBOSE: OnceLock<Mutex<bool>> = OnceLock::new();
    VERBOSE.get_or_init(|| Mutex::new(false))
}

pub fn set_verbose(verb: bool) {
    let mut var = verbose_flag().lock().unwrap();
    *var = verb;
}

pub fn get_verbose() -> bool {
    *verbose_flag().lock().unwrap()
}

// tt - TokenTree
// ($($arg:tt)*) Variable number of tts
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {{
        if crate::log::get_verbose() {
            print!($($arg)*);
        }
    }};
}

#[macro_export]
macro_rules! verboseln {
    ($($arg:tt)*) => {{
        if crate::log::get_verbose() {
            println!($($arg)*);
        }
    }};
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    struct StringBuffWriter(Rc<RefCell<String>>);

    impl Write for StringBuffWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().push_str(&String::from_utf8_lossy(buf));
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_macros() {
        verbose!("something {}", 1);
        verboseln!("something {}", 1);
    }

    #[test]
    fn test_write_errln() {
        let buff = Rc::new(RefCell::new(String::new()));
        let mut handle = StringBuffWriter(buff.clone());
        write_errln!(handle, "Another {}", "error");
        assert_eq!(buff.borrow().as_str(), "Another error\n");
    }
}
