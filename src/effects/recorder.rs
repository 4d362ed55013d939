//! Recording sinks for inspection.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{
    AccountRecord, Accounting, EffectError, Effects, HookEvent, HookRunner, HookVerdict,
    MailMessage, Mailer,
};

#[derive(Debug, Default)]
struct Log {
    records: Vec<AccountRecord>,
    mails: Vec<MailMessage>,
    hooks: Vec<(HookEvent, String)>,
    verdicts: BTreeMap<HookEvent, HookVerdict>,
    broken_mailer: bool,
}

/// Records every side effect; clones share one log.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    log: Rc<RefCell<Log>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sinks writing into this recorder.
    pub fn effects(&self) -> Effects {
        Effects::new(
            Box::new(self.clone()),
            Box::new(self.clone()),
            Box::new(self.clone()),
        )
    }

    /// Answer `event` with `verdict` from now on.
    pub fn set_verdict(&self, event: HookEvent, verdict: HookVerdict) {
        self.log.borrow_mut().verdicts.insert(event, verdict);
    }

    /// Make mail delivery fail.
    pub fn break_mailer(&self) {
        self.log.borrow_mut().broken_mailer = true;
    }

    pub fn records(&self) -> Vec<AccountRecord> {
        self.log.borrow().records.clone()
    }

    /// Accounting records about `id`.
    pub fn records_for(&self, id: &str) -> Vec<AccountRecord> {
        self.log
            .borrow()
            .records
            .iter()
            .filter(|r| r.id == id)
            .cloned()
            .collect()
    }

    pub fn mails(&self) -> Vec<MailMessage> {
        self.log.borrow().mails.clone()
    }

    pub fn hooks(&self) -> Vec<(HookEvent, String)> {
        self.log.borrow().hooks.clone()
    }
}

impl Accounting for Recorder {
    fn record(&mut self, record: AccountRecord) -> Result<(), EffectError> {
        self.log.borrow_mut().records.push(record);
        Ok(())
    }
}

impl Mailer for Recorder {
    fn send(&mut self, mail: MailMessage) -> Result<(), EffectError> {
        let mut log = self.log.borrow_mut();
        if log.broken_mailer {
            return Err(EffectError::Mail(format!("cannot reach {}", mail.to)));
        }
        log.mails.push(mail);
        Ok(())
    }
}

impl HookRunner for Recorder {
    fn run(&mut self, event: HookEvent, resv_id: &str) -> Result<HookVerdict, EffectError> {
        let mut log = self.log.borrow_mut();
        log.hooks.push((event, resv_id.to_string()));
        Ok(log
            .verdicts
            .get(&event)
            .cloned()
            .unwrap_or(HookVerdict::Accept))
    }
}
