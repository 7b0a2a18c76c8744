//! User-facing payment status text.

use serde::{Deserialize, Serialize};

use crate::provider::CheckoutStatus;

/// Message language. Turkish is the storefront default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Tr,
    En,
}

/// Message for a checkout that is not (yet) paid.
pub fn status_message(status: CheckoutStatus, locale: Locale) -> &'static str {
    match (status, locale) {
        (CheckoutStatus::Open, Locale::Tr) => "Ödeme henüz tamamlanmadı",
        (CheckoutStatus::Open, Locale::En) => "Payment has not been completed yet",
        (CheckoutStatus::Expired, Locale::Tr) => "Ödeme oturumu süresi doldu",
        (CheckoutStatus::Expired, Locale::En) => "The payment session has expired",
        (CheckoutStatus::Failed, Locale::Tr) => "Ödeme başarısız oldu",
        (CheckoutStatus::Failed, Locale::En) => "The payment failed",
        (CheckoutStatus::Confirmed, Locale::Tr) => "Ödeme işleniyor",
        (CheckoutStatus::Confirmed, Locale::En) => "Payment is processing",
        (_, Locale::Tr) => "Ödeme durumu bilinmiyor",
        (_, Locale::En) => "Payment status is unknown",
    }
}

/// Shown when the credit has not been observed within the polling bound.
pub fn pending_message(locale: Locale) -> &'static str {
    match locale {
        Locale::Tr => {
            "Ödemeniz güvende. Bakiyeniz kısa süre içinde güncellenecek; \
             sayfayı yenileyebilir veya destek ile iletişime geçebilirsiniz."
        }
        Locale::En => {
            "Your payment is safe. Your balance will update shortly; \
             refresh later or contact support."
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Why a payment did not go through, as shown to the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFailureReason {
    Cancelled,
    Declined,
    Expired,
    InsufficientFunds,
    NetworkError,
    VerificationFailed,
    ProcessingError,
    CardError,
    AuthenticationFailed,
    Default,
}

/// Title and body for a failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureMessage {
    pub title: &'static str,
    pub message: &'static str,
    pub severity: Severity,
}

impl PaymentFailureReason {
    /// Maps a processor error code. Unrecognized codes map to `Default`.
    pub fn from_error_code(code: Option<&str>) -> Self {
        match code {
            Some("card_declined") => Self::Declined,
            Some("insufficient_funds") => Self::InsufficientFunds,
            Some("expired_card") | Some("incorrect_cvc") => Self::CardError,
            Some("processing_error") => Self::ProcessingError,
            Some("authentication_required") => Self::AuthenticationFailed,
            Some("checkout_expired") => Self::Expired,
            Some("checkout_cancelled") => Self::Cancelled,
            _ => Self::Default,
        }
    }

    /// Parses a reason name as carried in redirect query strings.
    pub fn from_reason(reason: Option<&str>) -> Self {
        reason
            .and_then(|r| serde_json::from_value(serde_json::Value::String(r.to_string())).ok())
            .unwrap_or(Self::Default)
    }

    /// Reason to show for a checkout that ended unpaid.
    pub fn for_status(status: CheckoutStatus) -> Self {
        match status {
            CheckoutStatus::Expired => Self::Expired,
            _ => Self::Default,
        }
    }

    pub fn message(self, locale: Locale) -> FailureMessage {
        use PaymentFailureReason::*;
        use Severity::*;

        let (title, message, severity) = match (self, locale) {
            (Cancelled, Locale::Tr) => (
                "Ödeme İptal Edildi",
                "Ödeme işlemini iptal ettiniz. İstediğiniz zaman tekrar deneyebilirsiniz.",
                Warning,
            ),
            (Cancelled, Locale::En) => (
                "Payment Cancelled",
                "You cancelled the payment. You can try again at any time.",
                Warning,
            ),
            (Declined, Locale::Tr) => (
                "Kart Reddedildi",
                "Bankanız ödemeyi reddetti. \
                 Lütfen kart bilgilerinizi kontrol edin veya başka bir kart deneyin.",
                Error,
            ),
            (Declined, Locale::En) => (
                "Card Declined",
                "Your bank declined the payment. Check your card details or try another card.",
                Error,
            ),
            (Expired, Locale::Tr) => (
                "Oturum Süresi Doldu",
                "Ödeme oturumunun süresi doldu. Lütfen tekrar deneyin.",
                Warning,
            ),
            (Expired, Locale::En) => (
                "Session Expired",
                "The payment session expired. Please try again.",
                Warning,
            ),
            (InsufficientFunds, Locale::Tr) => (
                "Yetersiz Bakiye",
                "Kartınızda yeterli bakiye bulunmuyor. Lütfen başka bir kart deneyin.",
                Error,
            ),
            (InsufficientFunds, Locale::En) => (
                "Insufficient Funds",
                "Your card does not have enough funds. Please try another card.",
                Error,
            ),
            (NetworkError, Locale::Tr) => (
                "Bağlantı Hatası",
                "Bir bağlantı hatası oluştu. \
                 Lütfen internet bağlantınızı kontrol edip tekrar deneyin.",
                Warning,
            ),
            (NetworkError, Locale::En) => (
                "Connection Error",
                "A connection error occurred. Check your connection and try again.",
                Warning,
            ),
            (VerificationFailed, Locale::Tr) => (
                "Doğrulama Başarısız",
                "Ödemeniz doğrulanamadı. Lütfen tekrar deneyin veya destek ile iletişime geçin.",
                Error,
            ),
            (VerificationFailed, Locale::En) => (
                "Verification Failed",
                "Your payment could not be verified. Try again or contact support.",
                Error,
            ),
            (ProcessingError, Locale::Tr) => (
                "İşlem Hatası",
                "Ödeme işlenirken bir hata oluştu. Bakiyeniz çekilmediyse tekrar deneyin.",
                Error,
            ),
            (ProcessingError, Locale::En) => (
                "Processing Error",
                "An error occurred while processing the payment. \
                 If you were not charged, try again.",
                Error,
            ),
            (CardError, Locale::Tr) => (
                "Kart Hatası",
                "Kart bilgilerinizde bir sorun var. Lütfen bilgilerinizi kontrol edin.",
                Error,
            ),
            (CardError, Locale::En) => (
                "Card Error",
                "There is a problem with your card details. Please check them.",
                Error,
            ),
            (AuthenticationFailed, Locale::Tr) => (
                "3D Secure Doğrulama Başarısız",
                "3D Secure doğrulaması başarısız oldu. Lütfen bankanızla iletişime geçin.",
                Error,
            ),
            (AuthenticationFailed, Locale::En) => (
                "3D Secure Failed",
                "3D Secure authentication failed. Please contact your bank.",
                Error,
            ),
            (Default, Locale::Tr) => (
                "Ödeme Başarısız",
                "Ödeme işlenirken bir hata oluştu. Lütfen tekrar deneyin.",
                Error,
            ),
            (Default, Locale::En) => (
                "Payment Failed",
                "An error occurred while processing the payment. Please try again.",
                Error,
            ),
        };

        FailureMessage {
            title,
            message,
            severity,
        }
    }
}
