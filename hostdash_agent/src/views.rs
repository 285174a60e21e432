//! The two HTML pages. The dashboard is a thin shell that renders the
//! websocket snapshots; all data comes from the JSON API.

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn login_page(error: Option<&str>) -> String {
    let banner = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, escape(e)))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>hostdash · login</title>
<style>body{{font-family:sans-serif;max-width:22rem;margin:4rem auto}}.error{{color:#b00}}input{{display:block;width:100%;margin:.4rem 0}}</style>
</head><body>
<h1>hostdash</h1>
{banner}
<form method="post" action="/login">
<input name="username" placeholder="username" autocomplete="username" required>
<input name="password" type="password" placeholder="password" autocomplete="current-password" required>
<button type="submit">Sign in</button>
</form>
</body></html>"#
    )
}

pub fn dashboard_page(username: &str, hostname: &str) -> String {
    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>hostdash · {host}</title>
<style>body{{font-family:sans-serif;margin:1rem}}table{{border-collapse:collapse;margin-bottom:1.5rem}}td,th{{padding:.2rem .6rem;border-bottom:1px solid #ddd;text-align:left}}#errors{{color:#b00}}</style>
</head><body>
<header><b>{host}</b> · signed in as {user} · <a href="/logout">logout</a></header>
<p id="metrics"></p><p id="errors"></p>
<h2>PM2</h2><table id="pm2"></table>
<h2>Containers</h2><table id="docker"></table>
<h2>Processes</h2><table id="procs"></table>
<script>
const act = (url) => fetch(url, {{method: "POST"}}).then(r => r.json()).then(r => r.success || alert(r.error));
const row = (cells) => "<tr>" + cells.map(c => "<td>" + c + "</td>").join("") + "</tr>";
const esc = (s) => String(s).replace(/[&<>"']/g, c => "&#" + c.charCodeAt(0) + ";");
const btn = (label, url) => `<button onclick="act('${{url}}')">${{label}}</button>`;
function render(s) {{
  const m = s.metrics;
  document.getElementById("metrics").textContent =
    `mem ${{m.mem.used_pct}}% · rx ${{m.net.rx_bps}} B/s · tx ${{m.net.tx_bps}} B/s`;
  document.getElementById("errors").textContent = s.errors.join(" | ");
  document.getElementById("pm2").innerHTML = (s.pm2 || []).map(p => row([
    esc(p.name), esc(p.status), p.cpu_percent + "%", p.mem_mb + " MB",
    btn("restart", `/api/pm2/${{p.pm2_id}}/restart`) + btn("stop", `/api/pm2/${{p.pm2_id}}/stop`)])).join("");
  document.getElementById("docker").innerHTML = (s.containers || []).map(c => row([
    esc(c.names.join(", ")), esc(c.state), c.stats ? c.stats.cpu_percent + "%" : "",
    c.stats ? c.stats.mem_used_mb + " MB" : "",
    btn("restart", `/api/docker/${{c.id}}/restart`) + btn("stop", `/api/docker/${{c.id}}/stop`)])).join("");
  document.getElementById("procs").innerHTML = (s.processes || []).map(p => row([
    p.pid, esc(p.user), p.cpu_percent, p.mem_percent, esc(p.state), esc(p.command),
    btn("kill", `/api/processes/${{p.pid}}/kill`) + btn("kill -9", `/api/processes/${{p.pid}}/forceKill`)])).join("");
}}
function connect() {{
  const ws = new WebSocket((location.protocol === "https:" ? "wss://" : "ws://") + location.host + "/ws");
  ws.onmessage = (ev) => render(JSON.parse(ev.data));
  ws.onclose = () => setTimeout(connect, 2000);
}}
connect();
</script>
</body></html>"#,
        host = escape(hostname),
        user = escape(username),
    )
}
