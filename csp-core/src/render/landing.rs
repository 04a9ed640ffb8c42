use super::html::{write_head, write_tail, Escaped};
use crate::domain::RootDomain;
use std::fmt::Write;

/// Render the landing page listing every known domain
///
/// Domains appear in the iteration order given; callers pass a sorted set.
pub fn render_index<'a>(title: &str, domains: impl IntoIterator<Item = &'a RootDomain>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_index(&mut out, title, domains);
    out
}

fn write_index<'a>(
    out: &mut String,
    title: &str,
    domains: impl IntoIterator<Item = &'a RootDomain>,
) -> std::fmt::Result {
    write_head(out, title)?;

    writeln!(out, "<div class=\"container\">")?;
    writeln!(out, "    <h1>{}</h1>", Escaped(title))?;
    writeln!(
        out,
        "    <div class=\"search\"><input type=\"text\" id=\"searchInput\" placeholder=\"Search for domains.\"></div>"
    )?;
    writeln!(out, "    <div class=\"domain-list\">")?;
    writeln!(out, "        <div id=\"rootDomainList\">")?;

    for (index, domain) in domains.into_iter().enumerate() {
        let name = Escaped(domain.as_str());
        writeln!(out, "            <div class=\"domain-list-item\" id=\"site-{}\">", index)?;
        writeln!(out, "                <a href=\"{}_csp.html\">{}</a>", name, name)?;
        writeln!(
            out,
            "                <button class=\"delete-button\" data-domain=\"{}\" data-item=\"site-{}\">Delete</button>",
            name, index
        )?;
        writeln!(out, "            </div>")?;
    }

    writeln!(out, "        </div>")?;
    writeln!(out, "    </div>")?;
    writeln!(out, "</div>")?;
    write_tail(out)
}
