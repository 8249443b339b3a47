//! HTML pages served by the captive portal.

use super::utils::escape_html;
use crate::fsm::ProvisioningMode;
use crate::fsm::context::ModeSnapshot;

const STYLE: &str = "body{font-family:sans-serif;max-width:28em;margin:2em auto;padding:0 1em}\
label,input,button{display:block;width:100%;margin:.4em 0}\
input,button{padding:.5em;font-size:1em}.err{color:#b00020}.muted{color:#666}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>{title}</title><style>{STYLE}</style></head>\
         <body><h1>{title}</h1>{body}</body></html>",
        title = escape_html(title),
    )
}

pub(super) fn setup_page(device_name: &str, error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"err\">{}</p>", escape_html(e)))
        .unwrap_or_default();
    let body = format!(
        "<p class=\"muted\">Frame {device}</p>{error}\
         <form method=\"post\" action=\"/setup/wifi\">\
         <label for=\"ssid\">Network name</label>\
         <input id=\"ssid\" name=\"ssid\" autocomplete=\"off\" required>\
         <label for=\"password\">Password</label>\
         <input id=\"password\" name=\"password\" type=\"password\" required>\
         <button type=\"submit\">Connect</button></form>\
         <p><img src=\"/setup/qrcode\" alt=\"\" width=\"160\"></p>",
        device = escape_html(device_name),
    );
    layout("Wi-Fi setup", &body)
}

pub(super) fn confirmation_page(network_id: &str) -> String {
    let body = format!(
        "<p>Connecting to <b>{}</b>.</p>\
         <p class=\"muted\">The setup network will now disappear. \
         If the frame cannot connect, reset it to try again.</p>",
        escape_html(network_id)
    );
    layout("Credentials saved", &body)
}

pub(super) fn message_page(title: &str, message: &str) -> String {
    layout(title, &format!("<p>{}</p>", escape_html(message)))
}

pub(super) fn status_page(device_name: &str, snapshot: &ModeSnapshot) -> String {
    let state = match snapshot.mode {
        ProvisioningMode::Unprovisioned { channel } => {
            format!("Waiting for Wi-Fi credentials over {channel}.")
        }
        ProvisioningMode::Transitioning if snapshot.last_failure.is_some() => {
            "Setup failed. Reset the frame to try again.".to_string()
        }
        ProvisioningMode::Transitioning => "Still configuring, please wait.".to_string(),
        ProvisioningMode::Provisioned => "Connected.".to_string(),
    };

    let mut body = format!(
        "<p class=\"muted\">Frame {}</p><p>{}</p>",
        escape_html(device_name),
        escape_html(&state)
    );
    if let Some(failure) = &snapshot.last_failure {
        body.push_str(&format!(
            "<p class=\"err\">{}: {}</p>",
            escape_html(failure.action),
            escape_html(&failure.reason)
        ));
    }
    if let Some(online) = snapshot.online {
        body.push_str(if online {
            "<p>Internet: reachable</p>"
        } else {
            "<p>Internet: unreachable</p>"
        });
    }
    body.push_str(
        "<form method=\"post\" action=\"/reset\">\
         <button type=\"submit\">Reset to setup mode</button></form>",
    );
    layout("Frame status", &body)
}
