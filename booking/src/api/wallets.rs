//! Wallet read endpoints (owner only).

use super::member;
use crate::server::AppState;
use crate::types::WalletId;
use crate::wallet::{LedgerEntry, Wallet};
use axum::{
    Json,
    extract::{Path, State},
};
use boxoffice_web::{AppError, CallerId, WebResult};

async fn owned_wallet(
    state: &AppState,
    caller: CallerId,
    wallet_id: WalletId,
) -> WebResult<Wallet> {
    let wallet = state.app.wallets().wallet(wallet_id).await?;
    if wallet.member_id == member(caller) {
        Ok(wallet)
    } else {
        Err(AppError::forbidden("wallet belongs to another member"))
    }
}

/// Balance, limits and running totals.
///
/// # Errors
///
/// 404 for an unknown wallet, 403 for someone else's.
pub async fn get_wallet(
    State(state): State<AppState>,
    caller: CallerId,
    Path(wallet_id): Path<WalletId>,
) -> WebResult<Json<Wallet>> {
    Ok(Json(owned_wallet(&state, caller, wallet_id).await?))
}

/// Ledger entries, oldest first.
///
/// # Errors
///
/// As [`get_wallet`].
pub async fn list_entries(
    State(state): State<AppState>,
    caller: CallerId,
    Path(wallet_id): Path<WalletId>,
) -> WebResult<Json<Vec<LedgerEntry>>> {
    owned_wallet(&state, caller, wallet_id).await?;
    Ok(Json(state.app.wallets().entries(wallet_id).await?))
}
