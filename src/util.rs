use crate::param::STATUS_CODES;

pub struct HtmlBuilder {
    title: String,
    head: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let reason = STATUS_CODES.get(&code).copied().unwrap_or("");
        let body = format!(
            r"
            <h1>{} {}</h1>
            {}
            ",
            code,
            reason,
            note.unwrap_or("")
        );
        Self {
            title,
            head: String::new(),
            css,
            body,
        }
    }

    /// 客户端渲染的外壳页面：挂载点、入口脚本与样式表
    pub fn shell(title: &str, script_src: Option<&str>, css: &[String]) -> Self {
        let mut head = String::new();
        for href in css {
            head.push_str(&format!(
                r#"<link rel="stylesheet" href="/{}">"#,
                escape_html(href.trim_start_matches('/'))
            ));
        }
        if let Some(src) = script_src {
            head.push_str(&format!(
                r#"<script type="module" src="{}"></script>"#,
                escape_html(src)
            ));
        }
        Self {
            title: escape_html(title),
            head,
            css: String::new(),
            body: r#"<div id="app"></div>"#.to_string(),
        }
    }

    /// 两列表格页面，每行一个 (链接, 说明)
    pub fn listing(title: &str, rows: &[(String, String)]) -> Self {
        let mut body = format!("<h1>{}</h1><hr><table>", escape_html(title));
        for (link, note) in rows {
            body.push_str(&format!(
                r#"
                <tr>
                    <td><a href="{}">{}</a></td>
                    <td>{}</td>
                </tr>
                "#,
                escape_html(link),
                escape_html(link),
                escape_html(note)
            ));
        }
        body.push_str("</table>");
        let css = r"
            table {
                border-collapse: collapse;
                width: 100%;
            }

            td {
                padding: 8px;
                border: none;
            }"
        .to_string();
        Self {
            title: escape_html(title),
            head: String::new(),
            css,
            body,
        }
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                    {}
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.head, self.body
        )
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}
