//! Page-context scripts for the gate: advisory overlay and the IP probe.

pub(crate) const OVERLAY_ID: &str = "egress-check-overlay";

/// Injects the blocking notice shown while the gate holds traffic.
pub(crate) fn blocking_overlay_js() -> String {
	format!(
		r#"(() => {{
	const existing = document.getElementById('{OVERLAY_ID}');
	if (existing) existing.remove();
	const overlay = document.createElement('div');
	overlay.id = '{OVERLAY_ID}';
	overlay.style.cssText = 'position:fixed;top:50%;left:50%;transform:translate(-50%,-50%);' +
		'background-color:#b00020;color:#ffd600;font-weight:bold;border:2px solid #ffd600;' +
		'padding:20px;border-radius:10px;font-family:Arial,sans-serif;font-size:18px;' +
		'text-align:center;z-index:2147483647;';
	overlay.textContent = 'Verifying egress identity, do not interact yet.';
	document.body.appendChild(overlay);
}})()"#
	)
}

/// Swaps the overlay to the success message once verification passed.
pub(crate) fn success_overlay_js(ip: &str) -> String {
	let ip = serde_json::to_string(ip).unwrap_or_else(|_| "\"\"".to_string());
	format!(
		r#"((ip) => {{
	const overlay = document.getElementById('{OVERLAY_ID}');
	if (!overlay) return;
	overlay.textContent = 'Identity verified (' + ip + '). Loading the application...';
	overlay.style.backgroundColor = '#d4edda';
	overlay.style.borderColor = '#c3e6cb';
	overlay.style.color = '#155724';
}})({ip})"#
	)
}

/// Fetches the IP checker from page context so the call rides the proxy.
pub(crate) fn ip_probe_js(checker_url: &str) -> String {
	let url = serde_json::to_string(checker_url).unwrap_or_else(|_| "\"\"".to_string());
	format!("fetch({url}).then((response) => response.json())")
}
