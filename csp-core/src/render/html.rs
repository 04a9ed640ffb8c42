use std::fmt::{self, Write};

/// Text escaped for use in HTML element content and quoted attributes
pub(crate) struct Escaped<'a>(pub &'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            match c {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&#39;")?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Shared document head
pub(crate) fn write_head(out: &mut String, title: &str) -> fmt::Result {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"utf-8\">")?;
    writeln!(out, "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">")?;
    writeln!(out, "<title>{}</title>", Escaped(title))?;
    writeln!(out, "<link rel=\"stylesheet\" type=\"text/css\" href=\"styles.css\">")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")
}

pub(crate) fn write_tail(out: &mut String) -> fmt::Result {
    writeln!(out, "<script src=\"scripts.js\"></script>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}
