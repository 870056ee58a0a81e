use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use gymledger_shared::auth::Role;
use percent_encoding::percent_decode_str;

pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let decoded: Vec<String> = segmented(&path).into_iter().map(decode).collect();
    let segs: Vec<&str> = decoded.iter().map(String::as_str).collect();
    let prefix = ["api", "v1"];
    if !segs.as_slice().starts_with(&prefix) {
        tracing::warn!(?segs, "ACL: path outside api scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[prefix.len()..];

    let decision = allow_catalog(&method, rest).or_else(|_| match claims.role {
        Role::Staff => allow_staff(&method, rest),
        Role::Member => allow_member(&method, rest, auth),
    });

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_member = ?claims.member_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

/// Read-only catalog, open to every authenticated role.
fn allow_catalog(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["quests"] | ["rewards"] | ["badges"] if *method == Method::GET => Ok(()),
        ["rewards", id] if *method == Method::GET && is_id(id) => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_staff(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["admin", "members", id, "points"]
            if (*method == Method::GET || *method == Method::POST) && is_id(id) =>
        {
            Ok(())
        }
        ["admin", "members", id, "badges"] if *method == Method::POST && is_id(id) => Ok(()),
        ["admin", "rewards"] if *method == Method::POST => Ok(()),
        ["admin", "rewards", id, "restock"] if *method == Method::POST && is_id(id) => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

/// Members only reach `/me` routes; the member is taken from the token.
fn allow_member(method: &Method, rest: &[&str], auth: &AuthCtx) -> Result<(), AppError> {
    auth.member_id()?;
    let get = *method == Method::GET;
    let post = *method == Method::POST;
    match rest {
        ["me", "points" | "ledger" | "quests" | "attendance" | "exchanges" | "badges"] if get => {
            Ok(())
        }
        ["me", "attendance", "check-in"] if post => Ok(()),
        ["me", "exercises" | "diet" | "goals" | "posts"] if post => Ok(()),
        ["me", "goals", id, "achieve"] if post && is_id(id) => Ok(()),
        ["me", "rewards", id, "redeem"] if post && is_id(id) => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn is_id(seg: &str) -> bool {
    seg.parse::<i32>().is_ok()
}

