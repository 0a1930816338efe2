//! Session commands - login, logout, whoami, password

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use super::{get_context, password_or_prompt, require_session, text_or_prompt};
use crate::output;

pub fn login(username: Option<String>, password: Option<String>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let username = text_or_prompt(username, "Username")?;
    let password = password_or_prompt(password, "Password")?;

    let session = ctx.auth.login(&username, &password)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx.auth.auth_state()?)?);
        return Ok(());
    }

    output::success(&format!("Logged in as {}", session.admin().name));
    if session.username() == "admin" && password == "admin123" {
        output::warning("You are using the default password. Change it with `shelf password`.");
    }
    Ok(())
}

pub fn logout(json: bool) -> Result<()> {
    let ctx = get_context()?;
    ctx.auth.logout()?;

    if json {
        println!("{}", json!({ "isAuthenticated": false }));
    } else {
        output::success("Logged out");
    }
    Ok(())
}

pub fn whoami(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let state = ctx.auth.auth_state()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    match (&state.user, state.started_at) {
        (Some(user), started_at) if state.is_authenticated => {
            println!("{} ({})", user.name.bold(), user.username);
            println!("  Role: {}", user.role);
            if let Some(started) = started_at {
                println!("  Since: {}", output::format_date(started));
            }
        }
        _ => output::info("Not logged in"),
    }
    Ok(())
}

pub fn change_password(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let session = require_session(&ctx)?;

    let current = password_or_prompt(None, "Current password")?;
    let new = password_or_prompt(None, "New password")?;
    let confirm = password_or_prompt(None, "Confirm new password")?;
    if new != confirm {
        anyhow::bail!("Passwords do not match");
    }

    ctx.auth.change_password(&session, &current, &new)?;

    if json {
        println!("{}", json!({ "changed": true }));
    } else {
        output::success("Password changed");
    }
    Ok(())
}
