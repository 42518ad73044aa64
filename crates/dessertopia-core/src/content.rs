//! Fixed text carried by the engine: overlay phrases, the narrative passages,
//! the closing quote and user-facing notices.

use crate::catalog::{Bilingual, Lang};

/// Phrases the shock-stage overlay draws from.
pub const HORROR_PHRASES: [&str; 33] = [
    "Request for Research Termination",
    "연구 중단 요청드립니다",
    "연구 중단해주세요",
    "STOP",
    "PLEASE STOP",
    "실험을 멈춰주세요",
    "SYSTEM OVERRIDE REQUESTED",
    "DO NOT PROCEED",
    "중단 권고",
    "BREACH",
    "HELP ME",
    "THEY ARE WATCHING",
    "DATA CORRUPTION",
    "ETHICS VIOLATION",
    "ABORT",
    "FATAL ERROR",
    "VOID",
    "NO ESCAPE",
    "연구를 멈추십시오",
    "피실험자 사망 지수 폭발",
    "통제 불능",
    "D-100",
    "KILL_PROCESS",
    "LOG_ERROR_999",
    "BREACH_DETECTED",
    "ACCESS_VIOLATION",
    "TERMINATE_IMMEDIATELY",
    "SAVE THEM",
    "DARKNESS",
    "PLEASE",
    "DON'T LOOK",
    "ACCESS DENIED",
    "CRITICAL FAILURE",
];

/// A static bilingual passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Passage {
    pub ko: &'static str,
    pub en: &'static str,
}

impl Passage {
    #[must_use]
    pub const fn pick(&self, lang: Lang) -> &'static str {
        match lang {
            Lang::Ko => self.ko,
            Lang::En => self.en,
        }
    }

    #[must_use]
    pub fn to_bilingual(&self) -> Bilingual {
        Bilingual::new(self.ko, self.en)
    }
}

/// Narrative stage text, in display order.
pub const NARRATIVE_PASSAGES: [Passage; 6] = [
    Passage {
        ko: "디저토피아 연구소는 인간을 가장 쉽고, 가장 확실하게 이상향(도파민 상태) 에 도달시키기 위해 설립되었습니다.",
        en: "The Dessertopia Institute was founded to bring people to an ideal state (the dopamine state) as easily and as reliably as possible.",
    },
    Passage {
        ko: "연구소는 행복을 단순한 정신적 개념이 아닌, 화학적으로 재현 가능한 구조로 정의했습니다. 그리고 그 구조를 가장 순수하게 구현할 수 있는 매개체가 디저트라고 판단했습니다.",
        en: "The Institute defined happiness not as a mental concept but as a chemically reproducible structure, and concluded that dessert was the purest medium for building it.",
    },
    Passage {
        ko: "초기 실험에서는 디저트 섭취만으로도 목표 감정 상태에 쉽게 도달할 수 있었습니다. 그러나 실험이 반복될수록 감정은 점점 불안정해졌고, 그 조절은 더 이상 유지되지 않았습니다.",
        en: "In early trials, eating dessert alone was enough to reach the target emotional state. But as the trials were repeated, emotions grew unstable and could no longer be controlled.",
    },
    Passage {
        ko: "디저토피아는 디저트(Dessert)와 유토피아(Utopia)의 합성어입니다.",
        en: "Dessertopia is a blend of Dessert and Utopia.",
    },
    Passage {
        ko: "디저트를 통해 쉽게 이상적인 상태에 도달하려 했지만, 그 시도는 실패로 끝났습니다.",
        en: "It tried to reach the ideal state the easy way, through dessert, and the attempt ended in failure.",
    },
    Passage {
        ko: "결국 디저토피아는 이상향이 아닌, 불안과 붕괴를 떠올리게 하는 디스토피아를 연상시키는 이름으로 남았습니다.",
        en: "In the end Dessertopia remained a name that recalls not a utopia but a dystopia of anxiety and collapse.",
    },
];

/// Epilogue quote.
pub const CLOSING_QUOTE: Passage = Passage {
    ko: "지구상에 지옥이 만들어졌던 것은 항상 인간이 자신들의 천국을 만들려고 할 때였다.",
    en: "Hell on earth has always been created when humans tried to build their own heaven.",
};

pub const CLOSING_ATTRIBUTION: &str = "DESSERTOPIA Final Ethics Report";

/// Label of the narrative stage's continue action.
pub const CONTINUE_LABEL: &str = "[ NEXT ]";

/// Label of the epilogue's reboot action.
pub const REBOOT_LABEL: &str = "[ REBOOT SYSTEM ]";

/// Banner shown on the completion trigger.
pub const TRIGGER_BANNER: Passage = Passage {
    ko: "D+100 // UNAUTHORIZED_ACCESS_DETECTED // BREACH_LEVEL_7",
    en: "D+100 // UNAUTHORIZED_ACCESS_DETECTED // BREACH_LEVEL_7",
};

/// Shown when a sealed phase is selected.
pub const LOCKED_PHASE_NOTICE: Passage = Passage {
    ko: "이전 실험 결과 확인이 필요합니다.",
    en: "Previous experiment results must be reviewed first.",
};
