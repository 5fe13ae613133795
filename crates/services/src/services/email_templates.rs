use utils::text::{escape_html, format_cents};

use super::email::EmailMessage;

/// Rendered subject and bodies, not yet addressed.
#[derive(Debug, Clone)]
pub struct EmailTemplate {
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailTemplate {
    pub fn to(self, recipient: &str) -> EmailMessage {
        EmailMessage {
            to: recipient.to_string(),
            subject: self.subject,
            html: self.html,
            text: self.text,
        }
    }
}

fn layout(heading: &str, body_html: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <body style="font-family: -apple-system, Segoe UI, sans-serif; color: #111827; max-width: 560px; margin: 0 auto; padding: 24px;">
    <h1 style="font-size: 20px;">{heading}</h1>
    {body_html}
    <p style="color: #6b7280; font-size: 12px; margin-top: 32px;">VibeFunder</p>
  </body>
</html>"#
    )
}

pub fn otp_code(code: &str, ttl_minutes: i64) -> EmailTemplate {
    EmailTemplate {
        subject: format!("Your VibeFunder sign-in code: {code}"),
        html: layout(
            "Your sign-in code",
            &format!(
                r#"<p style="font-size: 28px; letter-spacing: 6px; font-weight: bold;">{code}</p>
    <p>This code expires in {ttl_minutes} minutes. If you did not request it, you can ignore this email.</p>"#
            ),
        ),
        text: format!(
            "Your VibeFunder sign-in code is {code}.\n\nIt expires in {ttl_minutes} minutes. If you did not request it, you can ignore this email."
        ),
    }
}

pub fn pledge_confirmation(campaign_title: &str, amount_cents: i64, campaign_url: &str) -> EmailTemplate {
    let amount = format_cents(amount_cents);
    let title = escape_html(campaign_title);
    let url = escape_html(campaign_url);
    EmailTemplate {
        subject: format!("Thanks for backing {campaign_title}"),
        html: layout(
            "Your pledge is confirmed",
            &format!(
                r#"<p>Your pledge of <strong>{amount}</strong> to <strong>{title}</strong> went through.</p>
    <p>Funds are released to the team milestone by milestone, as each one is accepted.</p>
    <p><a href="{url}">View the campaign</a></p>"#
            ),
        ),
        text: format!(
            "Your pledge of {amount} to {campaign_title} went through.\n\nFunds are released to the team milestone by milestone, as each one is accepted.\n\n{campaign_url}"
        ),
    }
}

pub fn campaign_update(
    campaign_title: &str,
    update_title: &str,
    content: &str,
    campaign_url: &str,
) -> EmailTemplate {
    let paragraphs: String = content
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p.trim()).replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n    ");
    EmailTemplate {
        subject: format!("{campaign_title}: {update_title}"),
        html: layout(
            &escape_html(update_title),
            &format!(
                r#"<p style="color: #6b7280;">Update from {}</p>
    {paragraphs}
    <p><a href="{}">View the campaign</a></p>"#,
                escape_html(campaign_title),
                escape_html(campaign_url)
            ),
        ),
        text: format!("Update from {campaign_title}\n\n{update_title}\n\n{content}\n\n{campaign_url}"),
    }
}

pub fn waitlist_joined() -> EmailTemplate {
    EmailTemplate {
        subject: "You're on the VibeFunder waitlist".to_string(),
        html: layout(
            "You're on the list",
            "<p>Thanks for your interest in VibeFunder. We'll email you as soon as your account is approved.</p>",
        ),
        text: "Thanks for your interest in VibeFunder. We'll email you as soon as your account is approved."
            .to_string(),
    }
}

pub fn waitlist_decision(approved: bool, app_base_url: &str) -> EmailTemplate {
    if approved {
        let url = escape_html(app_base_url);
        EmailTemplate {
            subject: "Your VibeFunder access is ready".to_string(),
            html: layout(
                "You're in",
                &format!(
                    r#"<p>Your waitlist request was approved. Sign in with this email address to get started.</p>
    <p><a href="{url}/signin">Sign in to VibeFunder</a></p>"#
                ),
            ),
            text: format!(
                "Your waitlist request was approved. Sign in with this email address to get started: {app_base_url}/signin"
            ),
        }
    } else {
        EmailTemplate {
            subject: "Your VibeFunder waitlist request".to_string(),
            html: layout(
                "Waitlist update",
                "<p>We're not able to offer you access right now. Thanks for your patience; we'll be in touch if that changes.</p>",
            ),
            text: "We're not able to offer you access right now. Thanks for your patience; we'll be in touch if that changes."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_text_is_escaped_in_html_only() {
        let t = campaign_update(
            "<script>alert(1)</script>",
            "Week 2 & beyond",
            "Shipped SSO.\n\nNext: <b>audit logs</b>",
            "https://vibefunder.ai/campaigns/1",
        );
        assert!(!t.html.contains("<script>"));
        assert!(t.html.contains("&lt;script&gt;"));
        assert!(t.html.contains("Week 2 &amp; beyond"));
        assert!(t.html.contains("&lt;b&gt;audit logs&lt;/b&gt;"));
        assert!(t.text.contains("<b>audit logs</b>"));
        assert_eq!(t.subject, "<script>alert(1)</script>: Week 2 & beyond");
    }

    #[test]
    fn pledge_confirmation_formats_amount() {
        let message = pledge_confirmation("Harden the prototype", 250_000, "https://x/c/1")
            .to("backer@example.com");
        assert_eq!(message.to, "backer@example.com");
        assert!(message.text.contains("$2,500.00"));
        assert!(message.html.contains("<strong>$2,500.00</strong>"));
    }

    #[test]
    fn otp_mentions_code_and_expiry() {
        let t = otp_code("042917", 10);
        assert!(t.subject.contains("042917"));
        assert!(t.text.contains("10 minutes"));
    }

    #[test]
    fn waitlist_decisions_differ() {
        assert!(waitlist_decision(true, "https://vibefunder.ai").text.contains("https://vibefunder.ai/signin"));
        assert!(!waitlist_decision(false, "https://vibefunder.ai").text.contains("signin"));
    }
}
