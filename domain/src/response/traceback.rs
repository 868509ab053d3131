//! Error traceback parsing for "Review & Fix"

use regex::Regex;

/// A file/line reference found in a traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub path: String,
    pub line: u32,
}

/// Extract file references from a traceback, innermost (last) first.
///
/// Understands Python `File "x.py", line N` frames and falls back to the
/// `path:line:` form used by most compilers and linters.
pub fn parse_traceback(traceback: &str) -> Vec<TraceFrame> {
    let mut frames = collect(traceback, r#"File "((?:[a-zA-Z]:)?[^"]+)", line (\d+)"#);
    if frames.is_empty() {
        frames = collect(
            traceback,
            r"(?m)((?:[a-zA-Z]:)?[^\s:]+\.[A-Za-z0-9]+):(\d+):",
        );
    }
    frames.reverse();
    frames
}

fn collect(text: &str, pattern: &str) -> Vec<TraceFrame> {
    let Ok(re) = Regex::new(pattern) else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let line = caps[2].parse().ok()?;
            Some(TraceFrame {
                path: caps[1].replace('\\', "/"),
                line,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_traceback_innermost_first() {
        let tb = r#"Traceback (most recent call last):
  File "/home/u/proj/main.py", line 10, in <module>
    run()
  File "/home/u/proj/utils.py", line 4, in run
    return 1 / 0
ZeroDivisionError: division by zero"#;
        let frames = parse_traceback(tb);
        assert_eq!(
            frames,
            vec![
                TraceFrame {
                    path: "/home/u/proj/utils.py".to_string(),
                    line: 4
                },
                TraceFrame {
                    path: "/home/u/proj/main.py".to_string(),
                    line: 10
                },
            ]
        );
    }

    #[test]
    fn test_compiler_style_fallback() {
        let frames = parse_traceback("src/app.py:12: error: Name 'x' is not defined");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].path, "src/app.py");
        assert_eq!(frames[0].line, 12);
    }

    #[test]
    fn test_no_frames() {
        assert!(parse_traceback("something went wrong").is_empty());
    }
}
