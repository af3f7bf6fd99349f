//! X12 277 claim-status transaction decoder.
//!
//! Turns the `~`-terminated segment body of a claim-status response into a
//! hierarchical claim/service/adjustment model and renders it as the status
//! text written into the enriched output. Decoding is a pure function of the
//! input text; malformed fields are skipped, never fatal, since the format
//! carries no checksum and partial extraction beats total failure.

use std::collections::HashSet;

use crate::codes::{category_description, status_description};

/// STC composite positions that can carry service-level status information.
const SERVICE_STATUS_POSITIONS: [usize; 3] = [1, 10, 11];

/// Entity identifier assumed when a status composite omits one.
const DEFAULT_ENTITY_CODE: &str = "1P";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjustment {
    pub status_code: String,
    pub reason_code: String,
    pub amount: String,
    pub entity_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceLine {
    pub cpt_code: String,
    pub modifier: String,
    pub charge: String,
    pub paid: String,
    pub date_of_service: String,
    pub status_code: String,
    pub status_reason_code: String,
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub claim_number: String,
    pub status_code: String,
    pub status_reason_code: String,
    pub total_charge: String,
    pub paid_amount: String,
    pub patient_name: String,
    pub patient_id: String,
    pub adjudication_date: String,
    pub check_number: String,
    pub check_date: String,
    pub services: Vec<ServiceLine>,
    pub claim_adjustments: Vec<Adjustment>,
}

impl Default for Claim {
    fn default() -> Self {
        Self {
            claim_number: String::new(),
            status_code: String::new(),
            status_reason_code: String::new(),
            total_charge: "0.00".to_string(),
            paid_amount: "0.00".to_string(),
            patient_name: String::new(),
            patient_id: String::new(),
            adjudication_date: String::new(),
            check_number: String::new(),
            check_date: String::new(),
            services: Vec::new(),
            claim_adjustments: Vec::new(),
        }
    }
}

/// Parser state: at most one open claim and one open service line at a time,
/// by construction.
#[derive(Debug, Default)]
struct ParseState {
    claims: Vec<Claim>,
    current: Option<Claim>,
    service_open: bool,
    pending_service_date: Option<String>,
    seen_service_adjustments: HashSet<String>,
}

impl ParseState {
    /// Commits the open claim, if any, to the result list.
    fn commit_current(&mut self) {
        if let Some(claim) = self.current.take() {
            self.claims.push(claim);
        }
        self.service_open = false;
        self.pending_service_date = None;
        self.seen_service_adjustments.clear();
    }

    fn open_claim(&mut self) {
        self.commit_current();
        self.current = Some(Claim::default());
    }

    fn handle_segment(&mut self, fields: &[&str]) {
        match field(fields, 0) {
            "HL" => self.handle_hierarchical_level(fields),
            "NM1" => self.handle_name(fields),
            "TRN" => self.handle_trace(fields),
            "STC" => self.handle_status(fields),
            "REF" => self.handle_reference(fields),
            "DTP" => self.handle_date(fields),
            "SVC" => self.handle_service(fields),
            _ => {}
        }
    }

    fn handle_hierarchical_level(&mut self, fields: &[&str]) {
        // HL*id*parent_id*level_code; level 22 opens a patient/claim scope.
        if field(fields, 3) == "22" {
            self.open_claim();
        }
    }

    fn handle_name(&mut self, fields: &[&str]) {
        let Some(claim) = self.current.as_mut() else {
            return;
        };
        if field(fields, 1) != "IL" {
            return;
        }
        let last_name = field(fields, 3);
        let first_name = field(fields, 4);
        claim.patient_name = format!("{first_name} {last_name}").trim().to_string();
        claim.patient_id = field(fields, 9).to_string();
    }

    fn handle_trace(&mut self, fields: &[&str]) {
        let Some(claim) = self.current.as_mut() else {
            return;
        };
        if fields.len() > 2 {
            claim.claim_number = fields[2].to_string();
        }
    }

    fn handle_status(&mut self, fields: &[&str]) {
        if self.service_open {
            self.handle_service_status(fields);
        } else {
            self.handle_claim_status(fields);
        }
    }

    /// Service-level STC: scan the candidate composite positions, drop
    /// repeats of an already-seen (status, reason, entity) triple within the
    /// current service line, and record the rest as adjustments.
    fn handle_service_status(&mut self, fields: &[&str]) {
        let Some(service) = self
            .current
            .as_mut()
            .and_then(|claim| claim.services.last_mut())
        else {
            return;
        };
        let amount = service.charge.clone();

        for position in SERVICE_STATUS_POSITIONS {
            let composite = field(fields, position);
            if composite.is_empty() {
                continue;
            }
            let (status_code, reason_code, entity_code) = split_status_composite(composite);
            if status_code.is_empty() && reason_code.is_empty() {
                continue;
            }
            let key = format!("{status_code}:{reason_code}:{entity_code}");
            if !self.seen_service_adjustments.insert(key) {
                continue;
            }
            if service.status_code.is_empty() {
                service.status_code = status_code.to_string();
            }
            if service.status_reason_code.is_empty() {
                service.status_reason_code = reason_code.to_string();
            }
            service.adjustments.push(Adjustment {
                status_code: status_code.to_string(),
                reason_code: reason_code.to_string(),
                amount: amount.clone(),
                entity_code: entity_code.to_string(),
            });
        }
    }

    fn handle_claim_status(&mut self, fields: &[&str]) {
        let Some(claim) = self.current.as_mut() else {
            return;
        };
        if fields.len() > 1 {
            let mut parts = fields[1].split(':');
            claim.status_code = parts.next().unwrap_or("").to_string();
            claim.status_reason_code = parts.next().unwrap_or("").to_string();
        }
        if let Some(date) = reformat_transaction_date(field(fields, 2)) {
            claim.adjudication_date = date;
        }
        let amount = field(fields, 4);
        if !amount.is_empty() {
            claim.total_charge = amount.to_string();
        }
        // Claim-level adjustments snapshot the status fields as of this
        // segment; the entity position is not populated at claim level.
        claim.claim_adjustments.push(Adjustment {
            status_code: claim.status_code.clone(),
            reason_code: claim.status_reason_code.clone(),
            amount: claim.total_charge.clone(),
            entity_code: String::new(),
        });
    }

    fn handle_reference(&mut self, fields: &[&str]) {
        let Some(claim) = self.current.as_mut() else {
            return;
        };
        // 1K = payer claim control number, which supersedes the TRN trace.
        if field(fields, 1) == "1K" {
            claim.claim_number = field(fields, 2).to_string();
        }
    }

    fn handle_date(&mut self, fields: &[&str]) {
        if self.current.is_none() || field(fields, 1) != "472" {
            return;
        }
        let date_format = field(fields, 2);
        let date_value = field(fields, 3);
        let formatted = match date_format {
            "D8" => reformat_transaction_date(date_value),
            // RD8 is a start-end range; the start date is the service date.
            "RD8" => date_value
                .split('-')
                .next()
                .and_then(reformat_transaction_date),
            _ => None,
        };
        let Some(date) = formatted else {
            return;
        };
        if self.service_open {
            if let Some(service) = self
                .current
                .as_mut()
                .and_then(|claim| claim.services.last_mut())
            {
                service.date_of_service = date;
            }
        } else {
            // Service date announced ahead of its SVC segment; stash it for
            // the next service line opened under this claim.
            self.pending_service_date = Some(date);
        }
    }

    fn handle_service(&mut self, fields: &[&str]) {
        let Some(claim) = self.current.as_mut() else {
            return;
        };
        let mut service = ServiceLine {
            charge: if fields.len() > 2 {
                fields[2].to_string()
            } else {
                "0.00".to_string()
            },
            paid: if fields.len() > 3 {
                fields[3].to_string()
            } else {
                "0.00".to_string()
            },
            ..ServiceLine::default()
        };

        // Composite procedure field, e.g. "HC:A4604" or "HC:J1100:JW".
        let composite = field(fields, 1);
        let parts: Vec<&str> = composite.split(':').collect();
        if parts.len() >= 3 {
            service.cpt_code = parts[1].to_string();
            service.modifier = parts[2].to_string();
        } else if parts.len() == 2 {
            service.cpt_code = parts[1].to_string();
        } else {
            service.cpt_code = composite.to_string();
        }

        if let Some(date) = self.pending_service_date.take() {
            service.date_of_service = date;
        }

        claim.services.push(service);
        self.service_open = true;
        self.seen_service_adjustments.clear();
    }
}

/// Decodes one claim-status transaction body into its claims, in document
/// order. Unrecognized segment tags are ignored.
pub fn decode(transaction_text: &str) -> Vec<Claim> {
    let mut state = ParseState::default();
    for raw_segment in transaction_text.split('~') {
        let segment = raw_segment.trim();
        if segment.is_empty() {
            continue;
        }
        let fields: Vec<&str> = segment.split('*').collect();
        state.handle_segment(&fields);
    }
    state.commit_current();
    state.claims
}

fn field<'a>(fields: &[&'a str], index: usize) -> &'a str {
    fields.get(index).copied().unwrap_or("")
}

/// Splits a "status:reason:entity" composite, defaulting the entity code.
fn split_status_composite(composite: &str) -> (&str, &str, &str) {
    let mut parts = composite.split(':');
    let status_code = parts.next().unwrap_or("");
    let reason_code = parts.next().unwrap_or("");
    let entity_code = match parts.next() {
        Some(entity) if !entity.is_empty() => entity,
        _ => DEFAULT_ENTITY_CODE,
    };
    (status_code, reason_code, entity_code)
}

/// Reformats an 8-digit CCYYMMDD transaction date to MM/DD/YYYY.
fn reformat_transaction_date(value: &str) -> Option<String> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}/{}/{}", &value[4..6], &value[6..8], &value[0..4]))
}

fn or_na(value: &str) -> &str {
    if value.is_empty() { "NA" } else { value }
}

/// Renders decoded claims into the human-readable status text: a brief
/// header per claim, a CPT summary when services exist, and one detailed
/// semicolon-joined block, with a blank line between claims.
pub fn render(claims: &[Claim]) -> String {
    let mut output: Vec<String> = Vec::new();

    for (index, claim) in claims.iter().enumerate() {
        let claim_label = format!("Claim {}", index + 1);
        let status_desc = category_description(&claim.status_code);

        output.push(format!(
            "{claim_label} - ${}: {} ({status_desc})",
            claim.total_charge, claim.status_code
        ));

        if !claim.status_reason_code.is_empty() {
            output.push(format!(
                "{claim_label} - {} - {}",
                claim.status_reason_code,
                status_description(&claim.status_reason_code)
            ));
        }

        if !claim.services.is_empty() {
            output.push(format!("{claim_label}:"));
            for (service_index, service) in claim.services.iter().enumerate() {
                let mut line = format!("CPT {}-{}", service_index + 1, service.cpt_code);
                for adjustment in &service.adjustments {
                    line.push_str(&format!(
                        " - {} - {}, - {} - {}",
                        adjustment.reason_code,
                        status_description(&adjustment.reason_code),
                        adjustment.entity_code,
                        status_description(&adjustment.entity_code)
                    ));
                }
                output.push(line);
            }
        }

        let mut detail = vec![
            format!(
                "{claim_label}: The Claim for ${} adjudicated on {}",
                claim.total_charge,
                or_na(&claim.adjudication_date)
            ),
            format!("Paid ${}", claim.paid_amount),
            format!("EFT/Check# {}", or_na(&claim.check_number)),
            format!("EFT/Check Dt. {}", or_na(&claim.check_date)),
            format!("Claim# {}", claim.claim_number),
            format!("{} - {status_desc}", claim.status_code),
        ];
        if !claim.status_reason_code.is_empty() {
            detail.push(format!(
                "{} - {}",
                claim.status_reason_code,
                status_description(&claim.status_reason_code)
            ));
        }
        for service in &claim.services {
            let cpt = if service.modifier.is_empty() {
                format!("CPT {}", service.cpt_code)
            } else {
                format!("CPT {}({})", service.cpt_code, service.modifier)
            };
            let mut parts = vec![
                format!("DOS {}", or_na(&service.date_of_service)),
                cpt,
                format!("Paid ${}", service.paid),
            ];
            for adjustment in &service.adjustments {
                parts.push(format!(
                    "{} - {}",
                    adjustment.reason_code,
                    status_description(&adjustment.reason_code)
                ));
                parts.push(format!(
                    "{} - {}",
                    adjustment.entity_code,
                    status_description(&adjustment.entity_code)
                ));
                parts.push(format!(
                    "{} - {}",
                    service.status_code,
                    category_description(&service.status_code)
                ));
            }
            detail.push(format!("{};", parts.join("; ")));
        }
        output.push(format!("{};", detail.join("; ")));
        output.push(String::new());
    }

    output.join("\n")
}
