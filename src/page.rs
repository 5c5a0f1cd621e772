//! HTML for the single upload page. Success, validation messages and errors
//! all go through [`render_index`].

use std::fmt::Write as _;

use axum::response::Html;

#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub message: Option<String>,
    pub prediction: Option<usize>,
    pub score: Option<f32>,
    pub image_url: Option<String>,
}

pub fn render_index(context: &PageContext) -> Html<String> {
    let mut body = String::with_capacity(1024);
    body.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Image Classifier</title>\n</head>\n<body>\n\
         <h1>Image Classifier</h1>\n\
         <form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"image\" accept=\"image/*\">\n\
         <button type=\"submit\">Predict</button>\n</form>\n",
    );

    if let Some(message) = &context.message {
        let _ = writeln!(body, "<p class=\"message\">{}</p>", escape(message));
    }
    if let Some(url) = &context.image_url {
        let _ = writeln!(
            body,
            "<img class=\"upload\" src=\"{}\" alt=\"uploaded image\" width=\"200\">",
            escape(url)
        );
    }
    if let Some(prediction) = context.prediction {
        let _ = write!(
            body,
            "<p class=\"prediction\">Prediction: <span id=\"prediction\">{prediction}</span>"
        );
        if let Some(score) = context.score {
            let _ = write!(body, " (score {score:.4})");
        }
        body.push_str("</p>\n");
    }

    body.push_str("</body>\n</html>\n");
    Html(body)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
